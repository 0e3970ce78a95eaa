use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use native_tls::TlsConnector;
use tracing::debug;

use crate::mailbox::error::MailboxError;
use crate::mailbox::types::MailboxCredentials;
use crate::resolver::{EndpointCandidate, Transport};

/// Opens one mailbox session, returns raw messages to classify, and closes it.
pub(crate) trait MailboxConnector {
    fn fetch_messages(
        &self,
        endpoint: &EndpointCandidate,
        credentials: &MailboxCredentials,
        limit: usize,
    ) -> Result<Vec<Vec<u8>>, MailboxError>;
}

pub(crate) struct ImapConnector {
    timeout: Duration,
    tls: TlsConnector,
}

impl ImapConnector {
    pub(crate) fn new(timeout: Duration, accept_invalid_certs: bool) -> Result<Self, MailboxError> {
        let tls = TlsConnector::builder()
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()
            .map_err(|source| MailboxError::Tls { source })?;
        Ok(Self { timeout, tls })
    }

    fn dial(&self, endpoint: &EndpointCandidate) -> Result<TcpStream, MailboxError> {
        let host = endpoint.host.as_str();
        let addrs: Vec<SocketAddr> = (host, endpoint.port)
            .to_socket_addrs()
            .map_err(|source| MailboxError::connect(host, source))?
            .collect();

        let mut last_err = None;
        for addr in &addrs {
            match TcpStream::connect_timeout(addr, self.timeout) {
                Ok(stream) => {
                    stream
                        .set_read_timeout(Some(self.timeout))
                        .map_err(|source| MailboxError::connect(host, source))?;
                    stream
                        .set_write_timeout(Some(self.timeout))
                        .map_err(|source| MailboxError::connect(host, source))?;
                    return Ok(stream);
                }
                Err(err) => last_err = Some(err),
            }
        }
        let source = last_err.unwrap_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::AddrNotAvailable, "no socket address")
        });
        Err(MailboxError::connect(host, source))
    }
}

impl MailboxConnector for ImapConnector {
    fn fetch_messages(
        &self,
        endpoint: &EndpointCandidate,
        credentials: &MailboxCredentials,
        limit: usize,
    ) -> Result<Vec<Vec<u8>>, MailboxError> {
        let stream = self.dial(endpoint)?;
        debug!(target: "mailprobe::mailbox", endpoint = %endpoint, "connected");

        match endpoint.transport {
            Transport::ImplicitTls => {
                let tls = self
                    .tls
                    .connect(&endpoint.host, stream)
                    .map_err(|err| MailboxError::TlsHandshake {
                        host: endpoint.host.clone(),
                        detail: err.to_string(),
                    })?;
                let mut client = imap::Client::new(tls);
                client.read_greeting().map_err(MailboxError::imap)?;
                run_session(client, credentials, limit)
            }
            Transport::ExplicitTls => {
                let mut client = imap::Client::new(stream);
                client.read_greeting().map_err(MailboxError::imap)?;
                let client = client
                    .secure(endpoint.host.as_str(), &self.tls)
                    .map_err(MailboxError::imap)?;
                run_session(client, credentials, limit)
            }
            Transport::Plain => {
                let mut client = imap::Client::new(stream);
                client.read_greeting().map_err(MailboxError::imap)?;
                run_session(client, credentials, limit)
            }
        }
    }
}

fn run_session<T: Read + Write>(
    client: imap::Client<T>,
    credentials: &MailboxCredentials,
    limit: usize,
) -> Result<Vec<Vec<u8>>, MailboxError> {
    let mut session = client
        .login(&credentials.address, &credentials.password)
        .map_err(|(source, _client)| MailboxError::Login { source })?;
    debug!(target: "mailprobe::mailbox", user = %credentials.address, "logged in");

    let fetched = fetch_inbox(&mut session, limit);
    if let Err(err) = session.logout() {
        debug!(target: "mailprobe::mailbox", error = %err, "logout failed");
    }
    fetched
}

fn fetch_inbox<T: Read + Write>(
    session: &mut imap::Session<T>,
    limit: usize,
) -> Result<Vec<Vec<u8>>, MailboxError> {
    let inbox = session.select("INBOX").map_err(MailboxError::imap)?;
    let mut sequence: Vec<u32> = session
        .search("UNSEEN")
        .map_err(MailboxError::imap)?
        .into_iter()
        .collect();
    sequence.sort_unstable();

    if sequence.is_empty() {
        sequence = recent_window(inbox.exists, limit);
        debug!(target: "mailprobe::mailbox", count = sequence.len(), "no unseen mail, scanning most recent");
    } else {
        debug!(target: "mailprobe::mailbox", count = sequence.len(), "scanning unseen mail");
    }
    if sequence.is_empty() {
        return Ok(Vec::new());
    }

    let set = sequence
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(",");
    let fetches = session.fetch(set, "RFC822").map_err(MailboxError::imap)?;
    Ok(fetches
        .iter()
        .filter_map(|fetch| fetch.body().map(<[u8]>::to_vec))
        .collect())
}

/// Sequence numbers of the newest `limit` messages out of `exists`.
pub(crate) fn recent_window(exists: u32, limit: usize) -> Vec<u32> {
    let limit = u32::try_from(limit).unwrap_or(u32::MAX);
    if exists == 0 || limit == 0 {
        return Vec::new();
    }
    let first = exists.saturating_sub(limit - 1).max(1);
    (first..=exists).collect()
}
