use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use crate::{Result, WhosonError};

/// These are the request "commands" that can be sent to a whoson server, one per line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// associate `data` with `ip`
    Login {
        /// the IP the data is stored under
        ip: IpAddr,
        /// the rest of the line, re-joined with single spaces
        data: String,
    },
    /// remove the record for `ip`
    Logout {
        /// the IP to remove
        ip: IpAddr,
    },
    /// look up the data stored for `ip`
    Query {
        /// the IP to look up
        ip: IpAddr,
    },
    /// end the session
    Quit,
}

impl Request {
    /// the upper-case keyword of this request
    pub fn method(&self) -> &'static str {
        match self {
            Request::Login { .. } => "LOGIN",
            Request::Logout { .. } => "LOGOUT",
            Request::Query { .. } => "QUERY",
            Request::Quit => "QUIT",
        }
    }

    /// the IP argument of this request, `None` for QUIT
    pub fn ip(&self) -> Option<IpAddr> {
        match self {
            Request::Login { ip, .. } | Request::Logout { ip } | Request::Query { ip } => Some(*ip),
            Request::Quit => None,
        }
    }

    /// the free text arguments following the IP
    pub fn args(&self) -> &str {
        match self {
            Request::Login { data, .. } => data,
            _ => "",
        }
    }
}

impl FromStr for Request {
    type Err = WhosonError;

    /// parses a single request line.
    ///
    /// # Errors
    /// [`WhosonError::CommandParse`] for blank lines, missing or invalid IP arguments,
    /// [`WhosonError::CommandNotFound`] for unknown keywords
    fn from_str(line: &str) -> Result<Self> {
        let mut words = line.split_whitespace();
        let keyword = words.next().ok_or(WhosonError::CommandParse)?.to_uppercase();

        match keyword.as_str() {
            "LOGIN" => {
                let ip = parse_ip(words.next())?;
                let data = words.collect::<Vec<_>>().join(" ");
                Ok(Request::Login { ip, data })
            }
            "LOGOUT" => Ok(Request::Logout {
                ip: parse_ip(words.next())?,
            }),
            "QUERY" => Ok(Request::Query {
                ip: parse_ip(words.next())?,
            }),
            "QUIT" => Ok(Request::Quit),
            _ => Err(WhosonError::CommandNotFound),
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::Login { ip, data } => write!(f, "LOGIN {} {}", ip, data),
            Request::Logout { ip } => write!(f, "LOGOUT {}", ip),
            Request::Query { ip } => write!(f, "QUERY {}", ip),
            Request::Quit => write!(f, "QUIT"),
        }
    }
}

/// parses an IP literal and folds IPv4-mapped IPv6 addresses onto their IPv4 form,
/// so that both spellings address the same record
fn parse_ip(word: Option<&str>) -> Result<IpAddr> {
    let ip: IpAddr = word
        .ok_or(WhosonError::CommandParse)?
        .parse()
        .map_err(|_| WhosonError::CommandParse)?;
    Ok(canonical_ip(ip))
}

/// returns the canonical form of `ip` used as a store key
pub fn canonical_ip(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(ip),
        v4 => v4,
    }
}

/// The response types that can be returned for any whoson [`Request`].
/// On the wire a response is its sigil immediately followed by the message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// `+`: the request succeeded
    Positive(String),
    /// `-`: the request was understood but nothing was found
    Negative(String),
    /// `*`: the request could not be parsed or processed
    BadRequest(String),
}

impl Response {
    /// the leading result character of this response
    pub fn sigil(&self) -> char {
        match self {
            Response::Positive(_) => '+',
            Response::Negative(_) => '-',
            Response::BadRequest(_) => '*',
        }
    }

    /// the message following the sigil
    pub fn msg(&self) -> &str {
        match self {
            Response::Positive(msg) | Response::Negative(msg) | Response::BadRequest(msg) => msg,
        }
    }

    /// true for `+` responses
    pub fn is_positive(&self) -> bool {
        matches!(self, Response::Positive(_))
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.sigil(), self.msg())
    }
}

impl FromStr for Response {
    type Err = WhosonError;

    fn from_str(line: &str) -> Result<Self> {
        let mut chars = line.chars();
        let sigil = chars.next();
        let msg = chars.as_str().to_string();
        match sigil {
            Some('+') => Ok(Response::Positive(msg)),
            Some('-') => Ok(Response::Negative(msg)),
            Some('*') => Ok(Response::BadRequest(msg)),
            _ => Err(WhosonError::Response(line.to_string())),
        }
    }
}
