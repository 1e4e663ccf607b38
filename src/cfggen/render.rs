//! Kea `Dhcp4` document rendering.
//!
//! The document skeleton is fixed; only the subnet, option and class lists
//! vary. Output is pretty-printed with a four-space indent and a trailing
//! newline, and every collection is ordered, so equal inputs render to
//! byte-identical text.

use serde::Serialize;

use crate::cfggen::template::RenderContext;
use crate::config::ServerConfig;

#[derive(Debug, Serialize)]
struct Document<'a> {
    #[serde(rename = "Dhcp4")]
    dhcp4: Dhcp4<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
struct Dhcp4<'a> {
    hooks_libraries: Vec<HookLibrary<'a>>,
    interfaces_config: InterfacesConfig<'a>,
    control_socket: ControlSocket<'a>,
    option_def: Vec<OptionDef<'a>>,
    subnet4: Vec<Subnet4<'a>>,
    loggers: Vec<Logger<'a>>,
    lease_database: LeaseDatabase<'a>,
    client_classes: Vec<ClientClassDef>,
}

#[derive(Debug, Serialize)]
struct HookLibrary<'a> {
    library: &'a str,
    parameters: HookParameters<'a>,
}

#[derive(Debug, Serialize)]
struct HookParameters<'a> {
    name: &'a str,
    sync: bool,
}

#[derive(Debug, Serialize)]
struct InterfacesConfig<'a> {
    interfaces: Vec<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
struct ControlSocket<'a> {
    socket_type: &'static str,
    socket_name: &'a str,
}

#[derive(Debug, Serialize)]
struct OptionDef<'a> {
    name: &'a str,
    code: u8,
    #[serde(rename = "type")]
    option_type: &'static str,
    space: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
struct Subnet4<'a> {
    id: u32,
    subnet: String,
    pools: Vec<Pool<'a>>,
    option_data: Vec<OptionData>,
    valid_lifetime: u32,
    reservations: Vec<()>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
struct Pool<'a> {
    pool: String,
    client_class: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
struct OptionData {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<u8>,
    data: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    csv_format: Option<bool>,
    always_send: bool,
}

impl OptionData {
    fn standard(name: &str, data: String) -> Self {
        Self {
            name: name.to_string(),
            code: None,
            data,
            csv_format: None,
            always_send: true,
        }
    }
}

#[derive(Debug, Serialize)]
struct Logger<'a> {
    name: &'static str,
    output_options: Vec<LoggerOutput<'a>>,
    severity: &'static str,
    debuglevel: u8,
}

#[derive(Debug, Serialize)]
struct LoggerOutput<'a> {
    output: &'a str,
    pattern: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
struct LeaseDatabase<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    persist: bool,
    name: &'a str,
    lfc_interval: u32,
}

#[derive(Debug, Serialize)]
struct ClientClassDef {
    name: String,
    test: String,
}

/// Serialize the render context into the server configuration document.
pub fn render_config(ctx: &RenderContext, server: &ServerConfig) -> Result<String, serde_json::Error> {
    let subnet4 = ctx
        .subnets
        .iter()
        .map(|subnet| {
            let mut option_data = Vec::new();
            if let Some(gateway) = subnet.gateway {
                option_data.push(OptionData::standard("routers", gateway.to_string()));
            }
            option_data.push(OptionData::standard(
                "dhcp-server-identifier",
                subnet.server_id.to_string(),
            ));
            option_data.extend(subnet.options.iter().map(|option| OptionData {
                name: option.name.clone(),
                code: Some(option.code),
                data: option.data.clone(),
                csv_format: (option.option_type == crate::cfggen::options::OptionType::Binary)
                    .then_some(false),
                always_send: option.always_send,
            }));

            Subnet4 {
                id: subnet.id,
                subnet: subnet.subnet.to_string(),
                pools: subnet
                    .pools
                    .iter()
                    .map(|pool| Pool {
                        pool: pool.range.to_string(),
                        client_class: &pool.client_class,
                    })
                    .collect(),
                option_data,
                valid_lifetime: subnet.lease_time,
                reservations: Vec::new(),
            }
        })
        .collect();

    let document = Document {
        dhcp4: Dhcp4 {
            hooks_libraries: vec![HookLibrary {
                library: &server.run_script_library,
                parameters: HookParameters {
                    name: &server.lease_update_script,
                    sync: false,
                },
            }],
            interfaces_config: InterfacesConfig {
                interfaces: vec![&server.listen_interface],
            },
            control_socket: ControlSocket {
                socket_type: "unix",
                socket_name: &server.control_socket,
            },
            option_def: ctx
                .option_defs
                .iter()
                .map(|option| OptionDef {
                    name: &option.name,
                    code: option.code,
                    option_type: option.option_type.as_str(),
                    space: "dhcp4",
                })
                .collect(),
            subnet4,
            loggers: vec![Logger {
                name: "kea-dhcp4",
                output_options: vec![LoggerOutput {
                    output: &server.log_path,
                    pattern: "%-5p %m\n",
                }],
                severity: "INFO",
                debuglevel: 0,
            }],
            lease_database: LeaseDatabase {
                kind: "memfile",
                persist: true,
                name: &server.lease_path,
                lfc_interval: server.lfc_interval_secs,
            },
            client_classes: ctx
                .client_classes
                .iter()
                .map(|class| ClientClassDef {
                    name: class.name.clone(),
                    test: class.test_expression(),
                })
                .collect(),
        },
    };

    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    document.serialize(&mut serializer)?;
    out.push(b'\n');
    // serde_json only ever emits UTF-8.
    Ok(String::from_utf8_lossy(&out).into_owned())
}
