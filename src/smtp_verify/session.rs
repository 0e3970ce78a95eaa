use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use native_tls::{HandshakeError, TlsConnector, TlsStream};

use crate::resolver::{EndpointCandidate, Transport};
use crate::smtp_verify::error::SmtpVerifyError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SmtpReply {
    pub code: u16,
    pub lines: Vec<String>,
}

impl SmtpReply {
    #[cfg(test)]
    pub fn new(code: u16, text: &str) -> Self {
        Self {
            code,
            lines: text.lines().map(str::to_string).collect(),
        }
    }

    pub fn is_positive_completion(&self) -> bool {
        (200..300).contains(&self.code)
    }

    pub fn is_transient_failure(&self) -> bool {
        (400..500).contains(&self.code)
    }

    pub fn is_permanent_failure(&self) -> bool {
        (500..600).contains(&self.code)
    }

    pub fn has_capability(&self, cap: &str) -> bool {
        self.lines.iter().any(|line| {
            line.split_whitespace()
                .next()
                .is_some_and(|token| token.eq_ignore_ascii_case(cap))
        })
    }

    /// Whole reply text, lower-cased, lines joined by a space.
    pub fn text_lower(&self) -> String {
        self.lines.join(" ").to_lowercase()
    }
}

/// One SMTP conversation. Implemented over TCP/TLS and by scripted test channels.
pub(crate) trait SmtpChannel {
    fn read_banner(&mut self) -> Result<SmtpReply, SmtpVerifyError>;
    fn send_command(&mut self, command: &str) -> Result<SmtpReply, SmtpVerifyError>;
    /// Issues STARTTLS and, on a 2xx reply, upgrades the stream in place.
    fn starttls(&mut self) -> Result<SmtpReply, SmtpVerifyError>;
    /// Best-effort QUIT; errors are recorded, never returned.
    fn quit(&mut self);
    fn take_transcript(&mut self) -> Vec<String>;
}

/// Opens channels to endpoints.
pub(crate) trait Connector {
    fn open(&self, endpoint: &EndpointCandidate) -> Result<Box<dyn SmtpChannel>, SmtpVerifyError>;
}

/// Real network connector with one shared TLS configuration.
pub(crate) struct TcpConnector {
    timeout: Duration,
    tls: TlsConnector,
}

impl TcpConnector {
    pub(crate) fn new(timeout: Duration, accept_invalid_certs: bool) -> Result<Self, SmtpVerifyError> {
        let tls = TlsConnector::builder()
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()
            .map_err(|source| SmtpVerifyError::Tls { source })?;
        Ok(Self { timeout, tls })
    }
}

impl Connector for TcpConnector {
    fn open(&self, endpoint: &EndpointCandidate) -> Result<Box<dyn SmtpChannel>, SmtpVerifyError> {
        let session = SmtpSession::open(endpoint, self.timeout, self.tls.clone())?;
        Ok(Box::new(session))
    }
}

#[derive(Debug)]
enum StreamState {
    Plain(TcpStream),
    Tls(TlsStream<TcpStream>),
    Invalid,
}

#[derive(Debug)]
pub(crate) struct SmtpStream {
    state: StreamState,
    buffer: Vec<u8>,
}

impl SmtpStream {
    pub fn connect(
        host: &str,
        addrs: &[SocketAddr],
        timeout: Duration,
    ) -> Result<Self, SmtpVerifyError> {
        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(addr, timeout) {
                Ok(stream) => {
                    stream
                        .set_read_timeout(Some(timeout))
                        .map_err(SmtpVerifyError::io)?;
                    stream
                        .set_write_timeout(Some(timeout))
                        .map_err(SmtpVerifyError::io)?;
                    return Ok(Self {
                        state: StreamState::Plain(stream),
                        buffer: Vec::new(),
                    });
                }
                Err(err) => last_err = Some(err),
            }
        }
        Err(match last_err {
            Some(err) => SmtpVerifyError::connect(host, err),
            None => SmtpVerifyError::NoAddress {
                host: host.to_string(),
            },
        })
    }

    pub fn upgrade_tls(
        &mut self,
        domain: &str,
        connector: &TlsConnector,
    ) -> Result<(), SmtpVerifyError> {
        let plain = match std::mem::replace(&mut self.state, StreamState::Invalid) {
            StreamState::Plain(stream) => stream,
            StreamState::Tls(stream) => {
                self.state = StreamState::Tls(stream);
                return Ok(());
            }
            StreamState::Invalid => {
                return Err(SmtpVerifyError::Protocol("invalid stream state".into()));
            }
        };

        // read/write timeouts set on the socket carry over to the TLS stream
        let tls = complete_handshake(connector, domain, plain)?;
        self.buffer.clear();
        self.state = StreamState::Tls(tls);
        Ok(())
    }

    pub fn send_command(&mut self, command: &str) -> Result<(), SmtpVerifyError> {
        let mut data = command.as_bytes().to_vec();
        data.extend_from_slice(b"\r\n");
        self.write_all(&data)
    }

    fn write_all(&mut self, data: &[u8]) -> Result<(), SmtpVerifyError> {
        let result = match &mut self.state {
            StreamState::Plain(stream) => stream.write_all(data).and_then(|_| stream.flush()),
            StreamState::Tls(stream) => stream.write_all(data).and_then(|_| stream.flush()),
            StreamState::Invalid => {
                return Err(SmtpVerifyError::Protocol("invalid stream state".into()));
            }
        };
        result.map_err(SmtpVerifyError::io)
    }

    pub fn read_reply(&mut self) -> Result<SmtpReply, SmtpVerifyError> {
        let mut lines = Vec::new();
        let mut code: Option<u16> = None;
        loop {
            let line = self.read_line()?;
            if line.len() < 3 || !line.is_char_boundary(3) {
                return Err(SmtpVerifyError::Protocol(format!("invalid reply: {line}")));
            }
            let parsed_code = line[..3]
                .parse::<u16>()
                .map_err(|_| SmtpVerifyError::Protocol(format!("invalid code in line: {line}")))?;
            match code {
                Some(existing) if existing != parsed_code => {
                    return Err(SmtpVerifyError::Protocol(format!(
                        "inconsistent reply codes: {existing} vs {parsed_code}"
                    )));
                }
                Some(_) => {}
                None => code = Some(parsed_code),
            }
            let is_last = line.as_bytes().get(3) != Some(&b'-');
            let text = line.get(4..).unwrap_or_default().to_string();
            lines.push(text);
            if is_last {
                break;
            }
        }
        Ok(SmtpReply {
            code: code.unwrap_or(0),
            lines,
        })
    }

    fn read_line(&mut self) -> Result<String, SmtpVerifyError> {
        loop {
            if let Some(pos) = self.buffer.iter().position(|byte| *byte == b'\n') {
                let mut line = self.buffer.drain(..=pos).collect::<Vec<_>>();
                if line.ends_with(b"\r\n") {
                    line.truncate(line.len() - 2);
                } else {
                    line.truncate(line.len() - 1);
                }
                return Ok(String::from_utf8_lossy(&line).into_owned());
            }

            let mut buf = [0u8; 512];
            let read = match &mut self.state {
                StreamState::Plain(stream) => stream.read(&mut buf),
                StreamState::Tls(stream) => stream.read(&mut buf),
                StreamState::Invalid => {
                    return Err(SmtpVerifyError::Protocol("invalid stream state".into()));
                }
            };
            let read = read.map_err(SmtpVerifyError::io)?;
            if read == 0 {
                return Err(SmtpVerifyError::io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed",
                )));
            }
            self.buffer.extend_from_slice(&buf[..read]);
        }
    }
}

fn complete_handshake(
    connector: &TlsConnector,
    domain: &str,
    stream: TcpStream,
) -> Result<TlsStream<TcpStream>, SmtpVerifyError> {
    match connector.connect(domain, stream) {
        Ok(tls) => Ok(tls),
        Err(HandshakeError::Failure(err)) => Err(SmtpVerifyError::Tls { source: err }),
        Err(HandshakeError::WouldBlock(mut mid)) => loop {
            match mid.handshake() {
                Ok(tls) => break Ok(tls),
                Err(HandshakeError::Failure(err)) => {
                    break Err(SmtpVerifyError::Tls { source: err });
                }
                Err(HandshakeError::WouldBlock(next)) => mid = next,
            }
        },
    }
}

pub(crate) struct SmtpSession {
    host: String,
    stream: SmtpStream,
    tls: TlsConnector,
    transcript: Vec<String>,
}

impl SmtpSession {
    /// Connects to `endpoint`; implicit-TLS endpoints are wrapped before the
    /// greeting is read.
    pub fn open(
        endpoint: &EndpointCandidate,
        timeout: Duration,
        tls: TlsConnector,
    ) -> Result<Self, SmtpVerifyError> {
        let addrs: Vec<SocketAddr> = (endpoint.host.as_str(), endpoint.port)
            .to_socket_addrs()
            .map_err(|source| SmtpVerifyError::Resolve {
                host: endpoint.host.clone(),
                source,
            })?
            .collect();
        let mut stream = SmtpStream::connect(&endpoint.host, &addrs, timeout)?;
        if endpoint.transport == Transport::ImplicitTls {
            stream.upgrade_tls(&endpoint.host, &tls)?;
        }
        Ok(Self {
            host: endpoint.host.clone(),
            stream,
            tls,
            transcript: Vec::new(),
        })
    }

    fn record(&mut self, direction: &str, message: &str) {
        self.transcript
            .push(format!("[{}] {direction}: {message}", self.host));
    }

    fn record_reply(&mut self, reply: &SmtpReply) {
        if reply.lines.is_empty() {
            self.record("S", &reply.code.to_string());
        } else {
            for line in reply.lines.clone() {
                self.record("S", &format!("{} {}", reply.code, line));
            }
        }
    }
}

impl SmtpChannel for SmtpSession {
    fn read_banner(&mut self) -> Result<SmtpReply, SmtpVerifyError> {
        let reply = self.stream.read_reply()?;
        self.record_reply(&reply);
        Ok(reply)
    }

    fn send_command(&mut self, command: &str) -> Result<SmtpReply, SmtpVerifyError> {
        self.record("C", command);
        self.stream.send_command(command)?;
        let reply = self.stream.read_reply()?;
        self.record_reply(&reply);
        Ok(reply)
    }

    fn starttls(&mut self) -> Result<SmtpReply, SmtpVerifyError> {
        let reply = self.send_command("STARTTLS")?;
        if !reply.is_positive_completion() {
            return Ok(reply);
        }
        let host = self.host.clone();
        self.stream.upgrade_tls(&host, &self.tls)?;
        self.record("*", "TLS established");
        Ok(reply)
    }

    fn quit(&mut self) {
        self.record("C", "QUIT");
        if self.stream.send_command("QUIT").is_err() {
            return;
        }
        if let Ok(reply) = self.stream.read_reply() {
            self.record_reply(&reply);
        }
    }

    fn take_transcript(&mut self) -> Vec<String> {
        std::mem::take(&mut self.transcript)
    }
}
