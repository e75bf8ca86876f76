//! `key=value` attribute arguments.

use bark_core::MetaMap;
use serde_json::Value;

use crate::error::{CliResult, InvalidAttrArgSnafu};

/// Split `key=value`. The value is parsed as JSON when it is valid JSON
/// (`3`, `true`, `[1,2]`, `"quoted"`) and kept as a plain string otherwise.
pub fn parse_attr(arg: &str) -> CliResult<(String, Value)> {
    let Some((key, raw)) = arg.split_once('=') else {
        return InvalidAttrArgSnafu { arg }.fail();
    };
    let key = key.trim();
    if key.is_empty() {
        return InvalidAttrArgSnafu { arg }.fail();
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}

pub fn parse_attrs(args: &[String]) -> CliResult<MetaMap> {
    let mut map = MetaMap::new();
    for arg in args {
        let (k, v) = parse_attr(arg)?;
        map.insert(k, v);
    }
    Ok(map)
}
