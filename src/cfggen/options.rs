//! Customized DHCP options.
//!
//! Only codes the allow-list marks `unassigned` may be customized, and each
//! value must be consistent with its declared type before it is rendered.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;

use serde::Serialize;

use crate::db::tables::CustomizedOptionEntry;
use crate::db::DHCP_SERVER_IPV4_CUSTOMIZED_OPTIONS;
use crate::diagnostics::Diagnostics;

/// Longest value accepted for string and binary options, in bytes.
pub const MAX_OPTION_LEN: usize = 253;

const UNASSIGNED: &str = "unassigned";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OptionType {
    Binary,
    Boolean,
    Ipv4Address,
    String,
    Uint8,
    Uint16,
    Uint32,
}

impl OptionType {
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "binary" => Self::Binary,
            "boolean" => Self::Boolean,
            "ipv4-address" => Self::Ipv4Address,
            "string" => Self::String,
            "uint8" => Self::Uint8,
            "uint16" => Self::Uint16,
            "uint32" => Self::Uint32,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Binary => "binary",
            Self::Boolean => "boolean",
            Self::Ipv4Address => "ipv4-address",
            Self::String => "string",
            Self::Uint8 => "uint8",
            Self::Uint16 => "uint16",
            Self::Uint32 => "uint32",
        }
    }

    /// Check `value` against the type and return it in the server's data
    /// format.
    pub fn normalize(&self, value: &str) -> Result<String, String> {
        match self {
            Self::String => {
                if value.len() > MAX_OPTION_LEN {
                    return Err(format!(
                        "string value is {} bytes, limit is {MAX_OPTION_LEN}",
                        value.len()
                    ));
                }
                Ok(value.replace(',', "\\,"))
            }
            Self::Binary => {
                let hex = value.trim();
                if hex.len() % 2 != 0 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
                    return Err(format!("'{hex}' is not an even-length hex string"));
                }
                if hex.len() / 2 > MAX_OPTION_LEN {
                    return Err(format!(
                        "binary value is {} bytes, limit is {MAX_OPTION_LEN}",
                        hex.len() / 2
                    ));
                }
                Ok(hex.to_ascii_lowercase())
            }
            Self::Boolean => match value.trim() {
                "true" | "1" => Ok("true".to_string()),
                "false" | "0" => Ok("false".to_string()),
                other => Err(format!("'{other}' is not a boolean")),
            },
            Self::Ipv4Address => value
                .trim()
                .parse::<Ipv4Addr>()
                .map(|ip| ip.to_string())
                .map_err(|_| format!("'{}' is not an IPv4 address", value.trim())),
            Self::Uint8 => int_value::<u8>(value, "uint8"),
            Self::Uint16 => int_value::<u16>(value, "uint16"),
            Self::Uint32 => int_value::<u32>(value, "uint32"),
        }
    }
}

fn int_value<T: std::str::FromStr + fmt::Display>(value: &str, width: &str) -> Result<String, String> {
    value
        .trim()
        .parse::<T>()
        .map(|v| v.to_string())
        .map_err(|_| format!("'{}' does not fit {width}", value.trim()))
}

impl fmt::Display for OptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Option codes and the type the allow-list file assigns them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionAllowList {
    codes: BTreeMap<u8, String>,
}

impl OptionAllowList {
    /// Parse `code,type` rows. Rows whose code is not a `u8` (including a
    /// header) are ignored.
    pub fn parse(content: &str) -> Self {
        let codes = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| {
                let (code, kind) = line.split_once(',')?;
                let code = code.trim().parse::<u8>().ok()?;
                Some((code, kind.trim().to_string()))
            })
            .collect();
        Self { codes }
    }

    pub fn load(path: &Path) -> std::io::Result<Self> {
        Ok(Self::parse(&fs::read_to_string(path)?))
    }

    /// Allow-list in which exactly `codes` are customizable.
    pub fn unassigned(codes: impl IntoIterator<Item = u8>) -> Self {
        Self {
            codes: codes.into_iter().map(|c| (c, UNASSIGNED.to_string())).collect(),
        }
    }

    pub fn allows(&self, code: u8) -> bool {
        self.codes.get(&code).map(|t| t == UNASSIGNED).unwrap_or(false)
    }

    pub fn allowed_codes(&self) -> BTreeSet<u8> {
        self.codes
            .iter()
            .filter(|(_, t)| *t == UNASSIGNED)
            .map(|(c, _)| *c)
            .collect()
    }
}

/// A validated customized option, value already in server data format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomizedOption {
    pub name: String,
    pub code: u8,
    pub option_type: OptionType,
    pub data: String,
    pub always_send: bool,
}

/// Validate every customized option row; non-conforming rows are skipped.
pub fn parse_customized_options(
    entries: &[CustomizedOptionEntry],
    allow_list: &OptionAllowList,
    diags: &mut Diagnostics,
) -> BTreeMap<String, CustomizedOption> {
    let table = DHCP_SERVER_IPV4_CUSTOMIZED_OPTIONS;
    let mut options = BTreeMap::new();

    for entry in entries {
        let Ok(code) = entry.id.parse::<u8>() else {
            diags.skip(table, &entry.name, format!("option code '{}' is not a number in 0..=255", entry.id));
            continue;
        };
        if !allow_list.allows(code) {
            diags.skip(table, &entry.name, format!("option code {code} is not customizable"));
            continue;
        }
        let Some(option_type) = OptionType::parse(&entry.option_type) else {
            diags.skip(table, &entry.name, format!("unsupported option type '{}'", entry.option_type));
            continue;
        };
        let data = match option_type.normalize(&entry.value) {
            Ok(data) => data,
            Err(reason) => {
                diags.skip(table, &entry.name, reason);
                continue;
            }
        };
        let always_send = match entry.always_send.as_str() {
            "true" => true,
            "false" => false,
            other => {
                diags.skip(table, &entry.name, format!("always_send '{other}' is not true or false"));
                continue;
            }
        };

        options.insert(
            entry.name.clone(),
            CustomizedOption {
                name: entry.name.clone(),
                code,
                option_type,
                data,
                always_send,
            },
        );
    }
    options
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, id: &str, option_type: &str, value: &str) -> CustomizedOptionEntry {
        CustomizedOptionEntry {
            name: name.to_string(),
            id: id.to_string(),
            option_type: option_type.to_string(),
            value: value.to_string(),
            always_send: "true".to_string(),
        }
    }

    #[test]
    fn test_allow_list_parsing() {
        let list = OptionAllowList::parse("code,type\n1,ipv4-address\n60,unassigned\n223, unassigned\nbad\n");
        assert!(list.allows(60));
        assert!(list.allows(223));
        assert!(!list.allows(1));
        assert!(!list.allows(61));
        assert_eq!(list.allowed_codes().len(), 2);
    }

    #[test]
    fn test_type_normalization() {
        assert_eq!(OptionType::String.normalize("a,b").unwrap(), "a\\,b");
        assert_eq!(OptionType::Boolean.normalize("1").unwrap(), "true");
        assert_eq!(OptionType::Binary.normalize("0A1b").unwrap(), "0a1b");
        assert!(OptionType::Binary.normalize("abc").is_err());
        assert!(OptionType::Uint8.normalize("256").is_err());
        assert_eq!(OptionType::Uint16.normalize("65535").unwrap(), "65535");
        assert!(OptionType::Ipv4Address.normalize("10.0.0").is_err());
        assert!(OptionType::String.normalize(&"x".repeat(MAX_OPTION_LEN)).is_ok());
        assert!(OptionType::String.normalize(&"x".repeat(MAX_OPTION_LEN + 1)).is_err());
    }

    #[test]
    fn test_invalid_options_are_skipped() {
        let list = OptionAllowList::unassigned([60, 223]);
        let mut bad_send = entry("bad_send", "60", "string", "x");
        bad_send.always_send = "maybe".to_string();
        let entries = vec![
            entry("option60", "60", "string", "dummy_value"),
            entry("not_allowed", "1", "string", "x"),
            entry("bad_code", "300", "string", "x"),
            entry("bad_type", "223", "uint64", "1"),
            entry("too_wide", "223", "uint8", "1000"),
            entry("too_long", "223", "string", &"x".repeat(254)),
            bad_send,
        ];
        let mut diags = Diagnostics::new();
        let options = parse_customized_options(&entries, &list, &mut diags);

        assert_eq!(options.len(), 1);
        let option = &options["option60"];
        assert_eq!(option.code, 60);
        assert_eq!(option.option_type, OptionType::String);
        assert!(option.always_send);
        assert_eq!(diags.len(), 6);
    }
}
