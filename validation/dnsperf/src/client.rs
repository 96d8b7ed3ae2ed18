//! DNS client performing one query round-trip per job.

use crate::config::Transport;
use crate::feed::QueryJob;
use async_trait::async_trait;
use dns_protocol::{with_message_id, ProtocolError, ResponseCode, ResponseHeader};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};

/// Largest datagram accepted as a UDP response.
const MAX_UDP_RESPONSE: usize = 65_535;

/// Result of one completed round-trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOutcome {
    pub rcode: ResponseCode,
    pub request_size: usize,
    pub response_size: usize,
    pub latency: Duration,
}

/// Why an exchange produced no response.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("query timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Performs a single query exchange.
///
/// Implementations must bound each call by their own timeout and be safe
/// to call concurrently from many workers.
#[async_trait]
pub trait Exchanger: Send + Sync {
    async fn exchange(&self, job: &QueryJob) -> Result<QueryOutcome, ExchangeError>;
}

/// UDP/TCP DNS client.
///
/// Each exchange uses its own socket or connection, so calls share no
/// mutable state.
#[derive(Debug, Clone)]
pub struct DnsClient {
    server: SocketAddr,
    transport: Transport,
    timeout: Duration,
}

impl DnsClient {
    pub fn new(server: SocketAddr, transport: Transport, timeout: Duration) -> Self {
        Self {
            server,
            transport,
            timeout,
        }
    }

    pub fn server(&self) -> SocketAddr {
        self.server
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    async fn exchange_udp(
        &self,
        request: &[u8],
        id: u16,
    ) -> Result<(ResponseHeader, usize, Duration), ExchangeError> {
        let local: SocketAddr = if self.server.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(self.server).await?;

        let start = Instant::now();
        socket.send(request).await?;

        let mut buf = vec![0u8; MAX_UDP_RESPONSE];
        loop {
            let len = socket.recv(&mut buf).await?;
            // Late answers to earlier queries and junk are dropped.
            match ResponseHeader::parse(&buf[..len]) {
                Ok(header) if header.id == id && header.is_response() => {
                    return Ok((header, len, start.elapsed()));
                }
                _ => continue,
            }
        }
    }

    async fn exchange_tcp(
        &self,
        request: &[u8],
        id: u16,
    ) -> Result<(ResponseHeader, usize, Duration), ExchangeError> {
        let mut stream = TcpStream::connect(self.server).await?;
        stream.set_nodelay(true)?;

        let mut framed = Vec::with_capacity(request.len() + 2);
        framed.extend_from_slice(&(request.len() as u16).to_be_bytes());
        framed.extend_from_slice(request);

        let start = Instant::now();
        stream.write_all(&framed).await?;

        let len = stream.read_u16().await? as usize;
        let mut buf = vec![0u8; len];
        stream.read_exact(&mut buf).await?;
        let latency = start.elapsed();

        let header = ResponseHeader::parse(&buf)?;
        if header.id != id || !header.is_response() {
            return Err(ProtocolError::Malformed(format!(
                "unexpected response ID {} for query {}",
                header.id, id
            ))
            .into());
        }

        Ok((header, len, latency))
    }
}

#[async_trait]
impl Exchanger for DnsClient {
    async fn exchange(&self, job: &QueryJob) -> Result<QueryOutcome, ExchangeError> {
        let id: u16 = rand::random();
        let request = with_message_id(&job.wire, id)?;

        let round_trip = async {
            match self.transport {
                Transport::Udp => self.exchange_udp(&request, id).await,
                Transport::Tcp => self.exchange_tcp(&request, id).await,
            }
        };

        let (header, response_size, latency) = tokio::time::timeout(self.timeout, round_trip)
            .await
            .map_err(|_| ExchangeError::Timeout(self.timeout))??;

        Ok(QueryOutcome {
            rcode: header.response_code(),
            request_size: request.len(),
            response_size,
            latency,
        })
    }
}
