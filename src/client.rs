use std::io::{BufRead, BufReader, BufWriter, Write};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, TcpStream, ToSocketAddrs, UdpSocket};
use std::time::Duration;

use tracing::debug;

use crate::command::Response;
use crate::{Result, WhosonError, CRLF, SESSION_TIMEOUT, UDP_BYTE_SIZE};

/// `WhosonClient` talks the line protocol to a whoson server, over TCP or UDP.
///
/// Over TCP every call is a request on the same connection. Over UDP every call is a single
/// datagram answered by a single datagram; a lost datagram surfaces as a timeout error.
pub struct WhosonClient {
    conn: Conn,
}

enum Conn {
    Tcp {
        reader: BufReader<TcpStream>,
        writer: BufWriter<TcpStream>,
    },
    Udp(UdpSocket),
}

impl WhosonClient {
    /// connects to the server at `addr` using `mode`, either `tcp` or `udp` (case insensitive)
    ///
    /// # Errors
    /// `WhosonError::Parsing` for any other mode, IO errors if the server cannot be reached
    pub fn dial<A: ToSocketAddrs>(mode: &str, addr: A) -> Result<Self> {
        let conn = match mode.to_ascii_lowercase().as_str() {
            "tcp" => {
                let tcp = TcpStream::connect(addr)?;
                let writer = BufWriter::new(tcp.try_clone()?);
                Conn::Tcp {
                    reader: BufReader::new(tcp),
                    writer,
                }
            }
            "udp" => {
                let remote = first_addr(addr)?;
                let local = match remote {
                    SocketAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
                    SocketAddr::V6(_) => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
                };
                let socket = UdpSocket::bind(local)?;
                socket.connect(remote)?;
                Conn::Udp(socket)
            }
            other => return Err(WhosonError::Parsing(format!("unknown protocol: {}", other))),
        };
        let client = WhosonClient { conn };
        client.set_timeout(SESSION_TIMEOUT)?;
        Ok(client)
    }

    /// sets how long a call waits for the response
    pub fn set_timeout(&self, timeout: Duration) -> Result<()> {
        match &self.conn {
            Conn::Tcp { writer, .. } => {
                writer.get_ref().set_read_timeout(Some(timeout))?;
                writer.get_ref().set_write_timeout(Some(timeout))?;
            }
            Conn::Udp(socket) => socket.set_read_timeout(Some(timeout))?,
        }
        Ok(())
    }

    /// sends `LOGIN <ip> <data>`
    pub fn login(&mut self, ip: &str, data: &str) -> Result<Response> {
        self.do_api(&format!("LOGIN {} {}", ip, data))
    }

    /// sends `LOGOUT <ip>`
    pub fn logout(&mut self, ip: &str) -> Result<Response> {
        self.do_api(&format!("LOGOUT {}", ip))
    }

    /// sends `QUERY <ip>`
    pub fn query(&mut self, ip: &str) -> Result<Response> {
        self.do_api(&format!("QUERY {}", ip))
    }

    /// sends `QUIT`. A TCP server closes the connection after answering.
    pub fn quit(&mut self) -> Result<Response> {
        self.do_api("QUIT")
    }

    /// sends one request line and reads its response
    ///
    /// # Errors
    /// IO errors, or `WhosonError::Response` if the reply is not a content line followed by a
    /// blank line starting with a known sigil
    pub fn do_api(&mut self, line: &str) -> Result<Response> {
        let request = format!("{}{}{}", line, CRLF, CRLF);
        let (l1, l2) = match &mut self.conn {
            Conn::Tcp { reader, writer } => {
                writer.write_all(request.as_bytes())?;
                writer.flush()?;
                (read_line(reader)?, read_line(reader)?)
            }
            Conn::Udp(socket) => {
                socket.send(request.as_bytes())?;
                let mut buf = [0u8; UDP_BYTE_SIZE];
                let n = socket.recv(&mut buf)?;
                let reply = String::from_utf8_lossy(&buf[..n]);
                let mut lines = reply.split(CRLF);
                (
                    lines.next().map(str::to_string),
                    lines.next().map(str::to_string),
                )
            }
        };
        debug!(request = line, response = ?l1, "doAPI");

        match (l1, l2) {
            (Some(l1), Some(l2)) if !l1.is_empty() && l2.is_empty() => l1.parse(),
            (l1, _) => Err(WhosonError::Response(l1.unwrap_or_default())),
        }
    }
}

fn first_addr<A: ToSocketAddrs>(addr: A) -> Result<SocketAddr> {
    addr.to_socket_addrs()?
        .next()
        .ok_or_else(|| WhosonError::Parsing("no address to dial".to_string()))
}

/// reads one line without its terminator, `None` at EOF
fn read_line(reader: &mut BufReader<TcpStream>) -> Result<Option<String>> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(&['\r', '\n'][..]).to_string()))
}
