//! ODBC-style connection strings for the SQL Server source.
//!
//! Accepts the `KEY=value;` form ODBC drivers use, including brace-quoted
//! values with `}}` as an escaped closing brace:
//!
//! ```text
//! DRIVER={ODBC Driver 18 for SQL Server};SERVER=db,1433;DATABASE=AdventureWorks;
//! UID=sa;PWD={p;ss}};TrustServerCertificate=yes;
//! ```
//!
//! Keys are case-insensitive. `Data Source`, `Initial Catalog`, `User ID` and
//! `Password` are accepted as ADO.NET aliases.

use nom::{
    branch::alt,
    bytes::complete::{is_not, tag, take_while, take_while1},
    character::complete::{char, multispace0},
    combinator::{map, opt, value},
    multi::many0,
    sequence::{delimited, terminated},
    IResult,
};
use std::fmt;

use crate::error::{EtlError, EtlResult};

/// Default SQL Server TCP port.
pub const DEFAULT_PORT: u16 = 1433;

/// Resolved SQL Server connection parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlServerParams {
    pub host: String,
    /// Explicit TCP port. Without one, a named instance is located through
    /// the SQL Server Browser service and a default instance uses 1433.
    pub port: Option<u16>,
    pub instance: Option<String>,
    pub database: String,
    pub user: String,
    pub password: String,
    pub trust_server_certificate: bool,
    /// ODBC driver name; informational only, the TDS client ignores it.
    pub driver: Option<String>,
}

impl SqlServerParams {
    /// Whether the port has to be looked up by instance name.
    pub fn needs_browser(&self) -> bool {
        self.instance.is_some() && self.port.is_none()
    }

    /// Render back to an ODBC connection string, with the password masked.
    pub fn redacted(&self) -> String {
        let mut out = String::new();
        if let Some(driver) = &self.driver {
            out.push_str(&format!("DRIVER={};", braced_value(driver)));
        }
        let mut server = self.host.clone();
        if let Some(instance) = &self.instance {
            server.push_str(&format!("\\{}", instance));
        }
        if let Some(port) = self.port {
            server.push_str(&format!(",{}", port));
        }
        out.push_str(&format!("SERVER={};", server));
        out.push_str(&format!("DATABASE={};", braced_value(&self.database)));
        out.push_str(&format!("UID={};", braced_value(&self.user)));
        out.push_str("PWD=********;");
        if self.trust_server_certificate {
            out.push_str("TrustServerCertificate=yes;");
        }
        out
    }
}

impl fmt::Display for SqlServerParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

/// Brace-quote a value when it contains characters that would break parsing.
fn braced_value(v: &str) -> String {
    if v.contains([';', '{', '}']) || v.trim() != v {
        format!("{{{}}}", v.replace('}', "}}"))
    } else {
        v.to_string()
    }
}

/// Parse a connection string into SQL Server parameters.
pub fn parse(input: &str) -> EtlResult<SqlServerParams> {
    let pairs = parse_pairs(input)?;

    let mut driver = None;
    let mut server = None;
    let mut database = None;
    let mut user = None;
    let mut password = None;
    let mut trust = false;

    for (key, val) in pairs {
        match key.to_ascii_uppercase().as_str() {
            "DRIVER" => driver = Some(val),
            "SERVER" | "DATA SOURCE" | "ADDRESS" | "ADDR" => server = Some(val),
            "DATABASE" | "INITIAL CATALOG" => database = Some(val),
            "UID" | "USER ID" | "USER" => user = Some(val),
            "PWD" | "PASSWORD" => password = Some(val),
            "TRUSTSERVERCERTIFICATE" => trust = parse_flag(&val)?,
            _ => {}
        }
    }

    let server = server.ok_or_else(|| missing("SERVER"))?;
    let (host, instance, port) = parse_server(&server)?;

    Ok(SqlServerParams {
        host,
        port,
        instance,
        database: database.ok_or_else(|| missing("DATABASE"))?,
        user: user.ok_or_else(|| missing("UID"))?,
        password: password.unwrap_or_default(),
        trust_server_certificate: trust,
        driver,
    })
}

/// Parse the raw `KEY=value` pairs, in order.
pub fn parse_pairs(input: &str) -> EtlResult<Vec<(String, String)>> {
    match parse_all(input) {
        Ok(("", pairs)) => Ok(pairs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()),
        Ok((remaining, _)) => Err(EtlError::ConnectionString {
            position: input.len() - remaining.len(),
            message: format!("Unexpected content: '{}'", remaining),
        }),
        Err(e) => Err(EtlError::ConnectionString {
            position: 0,
            message: format!("Parse failed: {:?}", e),
        }),
    }
}

fn parse_all(input: &str) -> IResult<&str, Vec<(&str, String)>> {
    let (input, _) = multispace0(input)?;
    let (input, _) = many0(terminated(char(';'), multispace0))(input)?;
    let (input, pairs) = many0(terminated(parse_pair, opt(char(';'))))(input)?;
    let (input, _) = multispace0(input)?;
    Ok((input, pairs))
}

/// Parse a single `KEY=value` entry.
fn parse_pair(input: &str) -> IResult<&str, (&str, String)> {
    let (input, _) = multispace0(input)?;
    let (input, key) = take_while1(|c: char| c != '=' && c != ';')(input)?;
    let (input, _) = char('=')(input)?;
    let (input, _) = multispace0(input)?;
    let (input, val) = if input.starts_with('{') {
        parse_braced(input)?
    } else {
        parse_bare(input)?
    };
    let (input, _) = multispace0(input)?;
    Ok((input, (key.trim(), val)))
}

/// `{...}` with `}}` standing for a literal `}`.
fn parse_braced(input: &str) -> IResult<&str, String> {
    delimited(
        char('{'),
        map(many0(alt((is_not("}"), value("}", tag("}}"))))), |parts| {
            parts.concat()
        }),
        char('}'),
    )(input)
}

fn parse_bare(input: &str) -> IResult<&str, String> {
    map(take_while(|c: char| c != ';'), |v: &str| v.trim().to_string())(input)
}

/// Split `[tcp:]host[\instance][,port]`.
fn parse_server(server: &str) -> EtlResult<(String, Option<String>, Option<u16>)> {
    let server = server.strip_prefix("tcp:").unwrap_or(server);
    let (addr, port) = match server.split_once(',') {
        Some((addr, port)) => {
            let port = port.trim().parse::<u16>().map_err(|_| EtlError::ConnectionString {
                position: 0,
                message: format!("Invalid port in SERVER: '{}'", port.trim()),
            })?;
            (addr.trim(), Some(port))
        }
        None => (server.trim(), None),
    };

    let (host, instance) = match addr.split_once('\\') {
        Some((host, instance)) => (host, Some(instance.to_string())),
        None => (addr, None),
    };

    if host.is_empty() {
        return Err(missing("SERVER"));
    }
    Ok((host.to_string(), instance, port))
}

fn parse_flag(v: &str) -> EtlResult<bool> {
    match v.to_ascii_lowercase().as_str() {
        "yes" | "true" | "1" => Ok(true),
        "no" | "false" | "0" => Ok(false),
        other => Err(EtlError::ConnectionString {
            position: 0,
            message: format!("Expected yes/no, got '{}'", other),
        }),
    }
}

fn missing(key: &str) -> EtlError {
    EtlError::ConnectionString {
        position: 0,
        message: format!("Missing required key {}", key),
    }
}
