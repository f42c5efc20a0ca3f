//! TFTP backend
//!
//! A minimal RFC 1350 read-only client in octet mode, enough to pull a
//! config or file payload off a PXE environment. The client pushes
//! received blocks into an async writer; bridging into the pull-based
//! fetch pipeline happens in the dispatcher.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::UdpSocket;
use tracing::debug;

const OP_RRQ: u16 = 1;
const OP_DATA: u16 = 3;
const OP_ACK: u16 = 4;
const OP_ERROR: u16 = 5;

const BLOCK_SIZE: usize = 512;
const RECV_TIMEOUT: Duration = Duration::from_secs(3);
const MAX_RETRIES: u32 = 5;

fn rrq_packet(filename: &str) -> Vec<u8> {
    let mut packet = Vec::with_capacity(filename.len() + 9);
    packet.extend_from_slice(&OP_RRQ.to_be_bytes());
    packet.extend_from_slice(filename.as_bytes());
    packet.push(0);
    packet.extend_from_slice(b"octet");
    packet.push(0);
    packet
}

fn ack_packet(block: u16) -> [u8; 4] {
    let mut packet = [0u8; 4];
    packet[..2].copy_from_slice(&OP_ACK.to_be_bytes());
    packet[2..].copy_from_slice(&block.to_be_bytes());
    packet
}

fn parse_error(payload: &[u8]) -> io::Error {
    let code = u16::from_be_bytes([payload[0], payload[1]]);
    let message = payload[2..]
        .split(|b| *b == 0)
        .next()
        .map(|m| String::from_utf8_lossy(m).into_owned())
        .unwrap_or_default();
    io::Error::new(
        io::ErrorKind::Other,
        format!("tftp error {code}: {message}"),
    )
}

/// Read `path` from the TFTP server at `addr` in octet mode, writing
/// each block into `dest` as it is acknowledged.
pub async fn receive(
    addr: &str,
    path: &str,
    dest: &mut (impl AsyncWrite + Unpin),
) -> io::Result<()> {
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    let server: SocketAddr = tokio::net::lookup_host(addr)
        .await?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("cannot resolve {addr}")))?;

    let mut buf = vec![0u8; 4 + BLOCK_SIZE];
    let mut expected: u16 = 1;
    // The server answers from a freshly allocated port (its transfer ID);
    // all traffic after the first response goes there.
    let mut peer: Option<SocketAddr> = None;
    let mut last_sent = rrq_packet(path);
    socket.send_to(&last_sent, server).await?;

    let mut retries = 0;
    loop {
        let (n, from) = match tokio::time::timeout(RECV_TIMEOUT, socket.recv_from(&mut buf)).await
        {
            Ok(result) => result?,
            Err(_) => {
                retries += 1;
                if retries > MAX_RETRIES {
                    return Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("tftp transfer from {addr} timed out"),
                    ));
                }
                let target = peer.unwrap_or(server);
                socket.send_to(&last_sent, target).await?;
                continue;
            }
        };
        retries = 0;
        match peer {
            None => peer = Some(from),
            Some(p) if p == from => {}
            // stray datagram from another endpoint
            Some(_) => continue,
        }

        if n < 4 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "short tftp packet",
            ));
        }
        let opcode = u16::from_be_bytes([buf[0], buf[1]]);
        match opcode {
            OP_DATA => {
                let block = u16::from_be_bytes([buf[2], buf[3]]);
                if block == expected {
                    dest.write_all(&buf[4..n]).await?;
                    last_sent = ack_packet(block).to_vec();
                    socket.send_to(&last_sent, from).await?;
                    expected = expected.wrapping_add(1);
                    if n - 4 < BLOCK_SIZE {
                        debug!("tftp transfer of {:?} from {} complete", path, addr);
                        return Ok(());
                    }
                } else if block == expected.wrapping_sub(1) {
                    // duplicate of the block we already have; re-ack
                    socket.send_to(&ack_packet(block), from).await?;
                }
            }
            OP_ERROR => return Err(parse_error(&buf[2..n])),
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("unexpected tftp opcode {opcode}"),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rrq_packet_layout() {
        let packet = rrq_packet("/boot/config");
        assert_eq!(&packet[..2], &[0, 1]);
        assert_eq!(&packet[2..14], b"/boot/config");
        assert_eq!(packet[14], 0);
        assert_eq!(&packet[15..20], b"octet");
        assert_eq!(packet[20], 0);
    }

    #[test]
    fn test_ack_packet_layout() {
        assert_eq!(ack_packet(258), [0, 4, 1, 2]);
    }

    #[test]
    fn test_parse_error_packet() {
        let err = parse_error(&[0, 1, b'n', b'o', b'p', b'e', 0]);
        assert!(err.to_string().contains("tftp error 1: nope"));
    }

    /// A one-shot in-process TFTP server for exercising the client.
    async fn serve_once(socket: UdpSocket, blocks: Vec<Vec<u8>>, then_error: bool) {
        let mut buf = vec![0u8; 1024];
        let (_, client) = socket.recv_from(&mut buf).await.unwrap();
        let mut block_num: u16 = 1;
        for block in blocks {
            let mut packet = vec![0, 3];
            packet.extend_from_slice(&block_num.to_be_bytes());
            packet.extend_from_slice(&block);
            socket.send_to(&packet, client).await.unwrap();
            socket.recv_from(&mut buf).await.unwrap(); // ack
            block_num += 1;
        }
        if then_error {
            let mut packet = vec![0, 5, 0, 2];
            packet.extend_from_slice(b"access violation\0");
            socket.send_to(&packet, client).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_receive_small_file() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();
        let payload = vec![0xabu8; 700];
        let blocks = vec![payload[..512].to_vec(), payload[512..].to_vec()];
        tokio::spawn(serve_once(server, blocks, false));

        let mut dest = Vec::new();
        receive(&addr.to_string(), "/file", &mut dest).await.unwrap();
        assert_eq!(dest, payload);
    }

    #[tokio::test]
    async fn test_receive_surfaces_server_error() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();
        // a full block keeps the transfer open, then the server aborts
        tokio::spawn(serve_once(server, vec![vec![0u8; 512]], true));

        let mut dest = Vec::new();
        let err = receive(&addr.to_string(), "/file", &mut dest)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("access violation"));
    }
}
