//! Full-mesh TCP transport.
//!
//! Rank `r` dials every lower rank and accepts every higher one. The dialler announces
//! its rank in a four-byte handshake. Frames are `[tag u8][len u32 LE][payload]`, and a
//! reader thread per peer moves arriving frames into the local mailbox.

use std::io::{self, BufReader, BufWriter, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::mailbox::{Envelope, Mailbox};
use super::{Probe, SendRequest, Tag, Transport};
use crate::error::{GasError, Result};
use crate::options::EngineOptions;

const FRAME_HEADER_LEN: usize = 5;

struct Peer {
    writer: Mutex<BufWriter<TcpStream>>,
    stream: TcpStream,
}

/// TCP endpoint for one rank.
pub struct TcpTransport {
    rank: usize,
    size: usize,
    peers: Vec<Option<Peer>>,
    mailbox: Arc<Mailbox>,
    readers: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpTransport")
            .field("rank", &self.rank)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

impl TcpTransport {
    /// Binds `addrs[rank]` and connects the mesh.
    pub fn connect(rank: usize, addrs: &[SocketAddr], options: &EngineOptions) -> Result<Self> {
        let addr = addrs.get(rank).ok_or_else(|| {
            GasError::InvalidArgument(format!("rank {rank} has no address"))
        })?;
        let listener = TcpListener::bind(addr)?;
        Self::from_listener(rank, listener, addrs, options)
    }

    /// Connects the mesh using an already bound listener for this rank.
    pub fn from_listener(
        rank: usize,
        listener: TcpListener,
        addrs: &[SocketAddr],
        options: &EngineOptions,
    ) -> Result<Self> {
        let size = addrs.len();
        if rank >= size {
            return Err(GasError::InvalidArgument(format!(
                "rank {rank} outside cluster of {size}"
            )));
        }
        let mut streams: Vec<Option<TcpStream>> = (0..size).map(|_| None).collect();

        for (peer, addr) in addrs.iter().enumerate().take(rank) {
            let mut stream = dial(*addr, options)?;
            stream.write_all(&(rank as u32).to_le_bytes())?;
            debug!(rank, peer, "transport.tcp.dialled");
            streams[peer] = Some(stream);
        }
        for _ in rank + 1..size {
            let (mut stream, remote) = listener.accept()?;
            let mut hello = [0u8; 4];
            stream.read_exact(&mut hello)?;
            let peer = u32::from_le_bytes(hello) as usize;
            if peer <= rank || peer >= size || streams[peer].is_some() {
                return Err(GasError::Transport(format!(
                    "unexpected handshake from {remote} claiming rank {peer}"
                )));
            }
            debug!(rank, peer, %remote, "transport.tcp.accepted");
            streams[peer] = Some(stream);
        }

        let mailbox = Arc::new(Mailbox::new());
        let mut peers = Vec::with_capacity(size);
        let mut readers = Vec::new();
        for (peer, stream) in streams.into_iter().enumerate() {
            let Some(stream) = stream else {
                peers.push(None);
                continue;
            };
            stream.set_nodelay(true)?;
            let read_half = stream.try_clone()?;
            let inbox = Arc::clone(&mailbox);
            readers.push(thread::spawn(move || read_loop(peer, read_half, inbox)));
            peers.push(Some(Peer {
                writer: Mutex::new(BufWriter::new(stream.try_clone()?)),
                stream,
            }));
        }
        info!(rank, size, "transport.tcp.mesh_ready");
        Ok(Self {
            rank,
            size,
            peers,
            mailbox,
            readers,
        })
    }
}

fn dial(addr: SocketAddr, options: &EngineOptions) -> Result<TcpStream> {
    let mut attempt = 0;
    loop {
        match TcpStream::connect(addr) {
            Ok(stream) => return Ok(stream),
            Err(err) if attempt < options.connect_retries => {
                attempt += 1;
                debug!(%addr, attempt, error = %err, "transport.tcp.dial_retry");
                thread::sleep(Duration::from_millis(options.connect_backoff_ms));
            }
            Err(err) => {
                return Err(GasError::Transport(format!(
                    "could not reach {addr} after {attempt} retries: {err}"
                )))
            }
        }
    }
}

fn read_loop(peer: usize, stream: TcpStream, mailbox: Arc<Mailbox>) {
    let mut reader = BufReader::new(stream);
    loop {
        match read_frame(&mut reader) {
            Ok((tag, payload)) => mailbox.push(Envelope {
                source: peer,
                tag,
                payload,
                delivered: None,
            }),
            Err(err) => {
                if err.kind() != io::ErrorKind::UnexpectedEof {
                    warn!(peer, error = %err, "transport.tcp.reader_failed");
                }
                mailbox.close(peer);
                return;
            }
        }
    }
}

fn read_frame(reader: &mut impl Read) -> io::Result<(u8, Vec<u8>)> {
    let mut header = [0u8; FRAME_HEADER_LEN];
    reader.read_exact(&mut header)?;
    let len = u32::from_le_bytes([header[1], header[2], header[3], header[4]]) as usize;
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    Ok((header[0], payload))
}

fn write_frame(writer: &mut impl Write, tag: Tag, payload: &[u8]) -> io::Result<()> {
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "frame exceeds 4 GiB"))?;
    let mut header = [0u8; FRAME_HEADER_LEN];
    header[0] = tag as u8;
    header[1..].copy_from_slice(&len.to_le_bytes());
    writer.write_all(&header)?;
    writer.write_all(payload)?;
    writer.flush()
}

impl Transport for TcpTransport {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn isend(&self, dest: usize, tag: Tag, payload: Vec<u8>) -> Result<SendRequest> {
        if dest == self.rank {
            self.mailbox.push(Envelope {
                source: self.rank,
                tag: tag as u8,
                payload,
                delivered: None,
            });
            return Ok(SendRequest::completed());
        }
        let peer = self
            .peers
            .get(dest)
            .and_then(Option::as_ref)
            .ok_or_else(|| GasError::InvalidArgument(format!("no connection to rank {dest}")))?;
        let mut writer = peer.writer.lock();
        write_frame(&mut *writer, tag, &payload)?;
        Ok(SendRequest::completed())
    }

    fn iprobe(&self) -> Result<Option<Probe>> {
        Ok(self.mailbox.probe())
    }

    fn recv(&self, source: usize, tag: Tag) -> Result<Vec<u8>> {
        if source >= self.size {
            return Err(GasError::InvalidArgument(format!(
                "source rank {source} out of range"
            )));
        }
        self.mailbox.take(source, tag)
    }

    fn disconnected_peer(&self) -> Option<usize> {
        self.mailbox.first_closed()
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        for peer in self.peers.iter().flatten() {
            let _ = peer.writer.lock().flush();
            let _ = peer.stream.shutdown(Shutdown::Both);
        }
        for reader in self.readers.drain(..) {
            let _ = reader.join();
        }
        debug!(rank = self.rank, "transport.tcp.closed");
    }
}
