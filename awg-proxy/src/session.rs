//! The two-direction proxy session: client address learning, the
//! client->server and server->client relay loops, reconnect with
//! exponential backoff, and the inactivity timeout checker.

use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use arc_swap::{ArcSwap, ArcSwapOption};
use awg_core::{generate_cps_packets, generate_junk, transform_inbound, transform_outbound, Config};
use rand::rngs::OsRng;
use socket2::{Domain, Protocol, Socket, Type};

use crate::error::ProxyError;

const RECV_BUFFER_BYTES: usize = 4 * 1024 * 1024;
const MAX_DATAGRAM: usize = 2048;
const BACKOFF_MIN: Duration = Duration::from_secs(1);
const BACKOFF_MAX: Duration = Duration::from_secs(30);
const IDLE_TIMEOUT: Duration = Duration::from_secs(1);
const TIMEOUT_CHECK_INTERVAL: Duration = Duration::from_secs(5);

struct SessionState {
    remote: ArcSwap<UdpSocket>,
    client_addr: ArcSwapOption<SocketAddr>,
    stopped: AtomicBool,
    last_active: AtomicBool,
    force_reconnect: AtomicBool,
    remote_host: String,
}

/// Binds, dials, and runs the session until `stopped` is observed. Returns
/// only on a fatal startup failure; graceful shutdown returns `Ok(())`
/// after every task has exited.
pub fn run(cfg: Config, listen_addr: &str, remote_host: &str) -> Result<(), ProxyError> {
    let listen_socket = bind_listen(listen_addr)?;
    let remote_socket = dial_remote(remote_host)?;

    let state = Arc::new(SessionState {
        remote: ArcSwap::from_pointee(remote_socket),
        client_addr: ArcSwapOption::empty(),
        stopped: AtomicBool::new(false),
        last_active: AtomicBool::new(false),
        force_reconnect: AtomicBool::new(false),
        remote_host: remote_host.to_string(),
    });
    let cfg = Arc::new(cfg);

    {
        let state = Arc::clone(&state);
        ctrlc::set_handler(move || {
            tracing::info!("shutdown signal received");
            state.stopped.store(true, Ordering::SeqCst);
        })
        .expect("failed to install SIGINT/SIGTERM handler");
    }

    let timeout_handle = {
        let state = Arc::clone(&state);
        let cfg = Arc::clone(&cfg);
        thread::spawn(move || timeout_checker(&state, &cfg))
    };

    let c2s_handle = {
        let state = Arc::clone(&state);
        let cfg = Arc::clone(&cfg);
        let listen_socket = listen_socket.try_clone().expect("clone listen socket");
        thread::spawn(move || client_to_server_loop(&state, &cfg, &listen_socket))
    };

    let s2c_handle = {
        let state = Arc::clone(&state);
        let cfg = Arc::clone(&cfg);
        let listen_socket = listen_socket.try_clone().expect("clone listen socket");
        thread::spawn(move || server_to_client_loop(&state, &cfg, &listen_socket))
    };

    let _ = c2s_handle.join();
    let _ = s2c_handle.join();
    let _ = timeout_handle.join();

    Ok(())
}

fn bind_listen(addr: &str) -> Result<UdpSocket, ProxyError> {
    let parsed = parse_listen_addr(addr);
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(|source| ProxyError::Bind { addr: parsed, source })?;
    socket.set_reuse_address(true).ok();
    socket
        .bind(&parsed.into())
        .map_err(|source| ProxyError::Bind { addr: parsed, source })?;
    socket.set_recv_buffer_size(RECV_BUFFER_BYTES).ok();
    socket.set_send_buffer_size(RECV_BUFFER_BYTES).ok();
    Ok(socket.into())
}

/// Accepts `host:port` or `:port` (meaning `0.0.0.0:port`), always IPv4 —
/// binding an unspecified dual-stack address would let the kernel hand back
/// IPv6-mapped addresses from a batched receive, corrupting client-address
/// tracking.
fn parse_listen_addr(addr: &str) -> SocketAddr {
    let full = if let Some(port) = addr.strip_prefix(':') {
        format!("0.0.0.0:{port}")
    } else {
        addr.to_string()
    };
    full.parse().unwrap_or_else(|_| {
        full.to_socket_addrs()
            .ok()
            .and_then(|mut it| it.find(SocketAddr::is_ipv4))
            .unwrap_or_else(|| "0.0.0.0:0".parse().unwrap())
    })
}

fn dial_remote(host: &str) -> Result<UdpSocket, ProxyError> {
    let resolved = host
        .to_socket_addrs()
        .map_err(|source| ProxyError::Resolve { host: host.to_string(), source })?
        .find(SocketAddr::is_ipv4)
        .ok_or_else(|| ProxyError::NoResolvedAddress { host: host.to_string() })?;

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(|source| ProxyError::Dial { addr: resolved, source })?;
    socket
        .connect(&resolved.into())
        .map_err(|source| ProxyError::Dial { addr: resolved, source })?;
    socket.set_recv_buffer_size(RECV_BUFFER_BYTES).ok();
    socket.set_send_buffer_size(RECV_BUFFER_BYTES).ok();
    Ok(socket.into())
}

fn now_unix_secs() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

fn is_would_block(e: &std::io::Error) -> bool {
    matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut)
}

#[cfg(not(target_os = "linux"))]
fn client_to_server_loop(state: &SessionState, cfg: &Config, listen_socket: &UdpSocket) {
    listen_socket.set_read_timeout(Some(IDLE_TIMEOUT)).ok();
    let mut rng = OsRng;
    let mut recv_buf = vec![0u8; MAX_DATAGRAM];
    let mut out_buf = Vec::with_capacity(MAX_DATAGRAM);
    let mut cps_counter: u32 = 0;

    loop {
        if state.stopped.load(Ordering::SeqCst) {
            return;
        }
        let (n, addr) = match listen_socket.recv_from(&mut recv_buf) {
            Ok(pair) => pair,
            Err(e) if is_would_block(&e) => continue,
            Err(_) => continue,
        };

        record_client_addr(state, addr);

        let send_junk = transform_outbound(cfg, &recv_buf[..n], &mut rng, &mut out_buf);
        let remote = state.remote.load();
        if send_junk {
            emit_decoy_burst(&remote, cfg, &mut cps_counter, &mut rng);
        }
        if let Err(e) = remote.send(&out_buf) {
            tracing::error!("send to remote failed: {e}");
        }
        state.last_active.store(true, Ordering::SeqCst);
    }
}

#[cfg(target_os = "linux")]
fn client_to_server_loop(state: &SessionState, cfg: &Config, listen_socket: &UdpSocket) {
    use crate::batch_linux::RecvBatch;
    use std::os::unix::io::AsRawFd;

    listen_socket.set_read_timeout(Some(IDLE_TIMEOUT)).ok();
    let mut rng = OsRng;
    let mut batch = RecvBatch::new();
    let mut out_buf = Vec::with_capacity(MAX_DATAGRAM);
    let mut cps_counter: u32 = 0;
    let fd = listen_socket.as_raw_fd();

    loop {
        if state.stopped.load(Ordering::SeqCst) {
            return;
        }
        let n = match batch.recv_with_addr(fd) {
            Ok(n) => n,
            Err(e) if is_would_block(&e) => continue,
            Err(_) => continue,
        };
        if n == 0 {
            continue;
        }

        let remote = state.remote.load();
        let mut pending: Vec<Vec<u8>> = Vec::with_capacity(n);

        for i in 0..n {
            record_client_addr(state, batch.source_addr(i));
            let send_junk = transform_outbound(cfg, batch.payload(i), &mut rng, &mut out_buf);
            if send_junk {
                // Preserve strict ordering: flush everything batched so
                // far, emit the decoy burst as individual sends, then the
                // transformed init, before resuming batching.
                flush_batch(fd, &mut pending);
                emit_decoy_burst(&remote, cfg, &mut cps_counter, &mut rng);
                if let Err(e) = remote.send(&out_buf) {
                    tracing::error!("send to remote failed: {e}");
                }
            } else {
                pending.push(out_buf.clone());
            }
        }
        flush_batch(fd, &mut pending);
        state.last_active.store(true, Ordering::SeqCst);
    }
}

#[cfg(target_os = "linux")]
fn flush_batch(fd: std::os::unix::io::RawFd, pending: &mut Vec<Vec<u8>>) {
    use crate::batch_linux::sendmmsg_connected;
    if pending.is_empty() {
        return;
    }
    let refs: Vec<&[u8]> = pending.iter().map(Vec::as_slice).collect();
    let mut sent = 0;
    while sent < refs.len() {
        match sendmmsg_connected(fd, &refs[sent..]) {
            Ok(0) => break,
            Ok(k) => sent += k,
            Err(e) if is_would_block(&e) => continue,
            Err(e) => {
                tracing::error!("batched send to remote failed: {e}");
                break;
            }
        }
    }
    pending.clear();
}

fn record_client_addr(state: &SessionState, addr: SocketAddr) {
    let changed = state.client_addr.load().as_deref() != Some(&addr);
    if changed {
        tracing::info!("learned client address {addr}");
        state.client_addr.store(Some(Arc::new(addr)));
    }
}

fn emit_decoy_burst(
    remote: &UdpSocket,
    cfg: &Config,
    cps_counter: &mut u32,
    rng: &mut OsRng,
) {
    let now = now_unix_secs();
    for packet in generate_cps_packets(&cfg.cps, cps_counter, now, rng) {
        if let Err(e) = remote.send(&packet) {
            tracing::error!("cps packet send failed: {e}");
            return;
        }
    }
    for packet in generate_junk(cfg, rng) {
        if let Err(e) = remote.send(&packet) {
            tracing::error!("junk packet send failed: {e}");
            return;
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn server_to_client_loop(state: &SessionState, cfg: &Config, listen_socket: &UdpSocket) {
    let mut recv_buf = vec![0u8; MAX_DATAGRAM];
    let mut backoff = BACKOFF_MIN;

    loop {
        if state.stopped.load(Ordering::SeqCst) {
            return;
        }
        let remote = state.remote.load();
        remote.set_read_timeout(Some(IDLE_TIMEOUT)).ok();

        match remote.recv(&mut recv_buf) {
            Ok(n) => {
                drop(remote);
                forward_to_client(state, listen_socket, cfg, &mut recv_buf[..n]);
                state.last_active.store(true, Ordering::SeqCst);
            }
            Err(e) if is_would_block(&e) => {
                drop(remote);
                if state.force_reconnect.swap(false, Ordering::SeqCst) {
                    reconnect(state, &mut backoff);
                }
            }
            Err(e) => {
                drop(remote);
                if state.stopped.load(Ordering::SeqCst) {
                    return;
                }
                tracing::info!("remote recv error, reconnecting: {e}");
                reconnect(state, &mut backoff);
            }
        }
    }
}

#[cfg(target_os = "linux")]
fn server_to_client_loop(state: &SessionState, cfg: &Config, listen_socket: &UdpSocket) {
    use crate::batch_linux::{sendmmsg_to, RecvBatch};
    use std::net::SocketAddrV4;
    use std::os::unix::io::AsRawFd;

    let mut batch = RecvBatch::new();
    let mut backoff = BACKOFF_MIN;
    let mut outgoing: Vec<Vec<u8>> = Vec::with_capacity(crate::batch_linux::BATCH);

    loop {
        if state.stopped.load(Ordering::SeqCst) {
            return;
        }
        let remote = state.remote.load();
        remote.set_read_timeout(Some(IDLE_TIMEOUT)).ok();
        let fd = remote.as_raw_fd();

        let n = match batch.recv_connected(fd) {
            Ok(n) => n,
            Err(e) if is_would_block(&e) => {
                drop(remote);
                if state.force_reconnect.swap(false, Ordering::SeqCst) {
                    reconnect(state, &mut backoff);
                }
                continue;
            }
            Err(e) => {
                drop(remote);
                if state.stopped.load(Ordering::SeqCst) {
                    return;
                }
                tracing::info!("remote recv error, reconnecting: {e}");
                reconnect(state, &mut backoff);
                continue;
            }
        };
        drop(remote);

        outgoing.clear();
        for i in 0..n {
            let mut payload = batch.payload(i).to_vec();
            if let Some(range) = transform_inbound(cfg, &mut payload) {
                outgoing.push(payload[range].to_vec());
            }
        }
        state.last_active.store(true, Ordering::SeqCst);

        let Some(client_addr) = state.client_addr.load().as_deref().copied() else {
            continue;
        };
        let SocketAddr::V4(client_v4) = client_addr else {
            // Learned address is never non-IPv4 on a udp4 listen socket;
            // fall back to per-message sends defensively.
            for pkt in &outgoing {
                let _ = listen_socket.send_to(pkt, client_addr);
            }
            continue;
        };

        let refs: Vec<&[u8]> = outgoing.iter().map(Vec::as_slice).collect();
        let mut sent = 0;
        let listen_fd = listen_socket.as_raw_fd();
        while sent < refs.len() {
            match sendmmsg_to(listen_fd, &refs[sent..], client_v4) {
                Ok(0) => break,
                Ok(k) => sent += k,
                Err(e) if is_would_block(&e) => continue,
                Err(e) => {
                    tracing::error!("batched send to client failed: {e}");
                    break;
                }
            }
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn forward_to_client(state: &SessionState, listen_socket: &UdpSocket, cfg: &Config, buf: &mut [u8]) {
    let Some(range) = transform_inbound(cfg, buf) else {
        return;
    };
    let Some(addr) = state.client_addr.load().as_deref().copied() else {
        return;
    };
    if let Err(e) = listen_socket.send_to(&buf[range], addr) {
        tracing::error!("send to client failed: {e}");
    }
}

fn reconnect(state: &SessionState, backoff: &mut Duration) {
    loop {
        if state.stopped.load(Ordering::SeqCst) {
            return;
        }
        match dial_remote(&state.remote_host) {
            Ok(socket) => {
                state.remote.store(Arc::new(socket));
                state.client_addr.store(None);
                *backoff = BACKOFF_MIN;
                tracing::info!("reconnected to {}", state.remote_host);
                return;
            }
            Err(e) => {
                tracing::info!("reconnect attempt to {} failed: {e}", state.remote_host);
                sleep_respecting_stop(state, *backoff);
                *backoff = (*backoff * 2).min(BACKOFF_MAX);
            }
        }
    }
}

fn sleep_respecting_stop(state: &SessionState, total: Duration) {
    let step = Duration::from_millis(100);
    let mut waited = Duration::ZERO;
    while waited < total {
        if state.stopped.load(Ordering::SeqCst) {
            return;
        }
        let remaining = total - waited;
        thread::sleep(step.min(remaining));
        waited += step;
    }
}

fn timeout_checker(state: &SessionState, cfg: &Config) {
    let threshold = (cfg.timeout_secs / TIMEOUT_CHECK_INTERVAL.as_secs()).max(1);
    let mut consecutive_idle = 0u64;

    loop {
        sleep_respecting_stop(state, TIMEOUT_CHECK_INTERVAL);
        if state.stopped.load(Ordering::SeqCst) {
            return;
        }
        let was_active = state.last_active.swap(false, Ordering::SeqCst);
        if was_active {
            consecutive_idle = 0;
            continue;
        }
        consecutive_idle += 1;
        if consecutive_idle >= threshold {
            tracing::info!("remote link idle for {}s, forcing reconnect", cfg.timeout_secs);
            state.force_reconnect.store(true, Ordering::SeqCst);
            consecutive_idle = 0;
        }
    }
}
