//! DNS/HTTP/TLS/ICMP probe library.
//!
//! One synchronous-from-the-caller's-perspective operation, [`probe`],
//! composed of four independent checks. Every probe absorbs its own
//! errors into `None`/`false` per spec §4.1 and §7 — nothing here ever
//! returns `Err` for a target being down.

use std::net::ToSocketAddrs;
use std::time::Duration;

use chrono::Local;
use common::ProbeSnapshot;
use common::TrafficLight;
use trust_dns_resolver::config::{ResolverConfig, ResolverOpts};
use trust_dns_resolver::TokioAsyncResolver;
use url::Url;

const USER_AGENT: &str = "PingFleet/1.0 (+healthcheck)";
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);
const TLS_TIMEOUT: Duration = Duration::from_secs(10);
const ICMP_TIMEOUT: Duration = Duration::from_secs(3);

pub struct ProbeOutcome {
    pub snapshot: ProbeSnapshot,
    pub errors_last: i64,
}

/// Runs all four checks against `url` and folds them into a snapshot. The
/// caller supplies `history` (the site's last `CLASSIFIER_WINDOW` entries)
/// so the classifier can apply hysteresis.
pub async fn probe(url: &str, history: &[ProbeSnapshot]) -> ProbeOutcome {
    let parsed = Url::parse(url).ok();
    let host = parsed.as_ref().and_then(|u| u.host_str()).unwrap_or_default().to_string();
    let is_https = parsed.as_ref().map(|u| u.scheme() == "https").unwrap_or(false);

    let dns_resolved = resolve_dns(&host).await;
    let (http_status, latency_ms, redirects) = probe_http(url).await;
    let ssl_days_left = if is_https {
        probe_tls(&host).await
    } else {
        None
    };
    let ping_ms = probe_icmp(&host).await;

    let errors_last = [http_status.is_none(), !dns_resolved].iter().filter(|x| **x).count() as i64;

    let mut snapshot = ProbeSnapshot {
        timestamp: Local::now().format("%Y-%m-%dT%H:%M:%S").to_string(),
        traffic_light: TrafficLight::Red,
        http_status,
        latency_ms,
        ping_ms,
        ssl_days_left,
        dns_resolved,
        redirects,
        errors_last: Some(errors_last),
    };
    snapshot.traffic_light = crate::classifier::classify(&snapshot, history);

    ProbeOutcome { snapshot, errors_last }
}

async fn resolve_dns(host: &str) -> bool {
    if host.is_empty() {
        return false;
    }
    let resolver = TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default());
    tokio::time::timeout(HTTP_TIMEOUT, resolver.lookup_ip(host))
        .await
        .map(|r| r.map(|ips| ips.iter().next().is_some()).unwrap_or(false))
        .unwrap_or(false)
}

/// Counts hops the redirect policy actually followed, mirroring
/// `pinger_checks.py`'s `len(resp.history)` rather than a final-vs-original
/// URL comparison (which can only ever report 0 or 1).
async fn probe_http(url: &str) -> (Option<i64>, Option<i64>, Option<i64>) {
    let redirect_count = std::sync::Arc::new(std::sync::atomic::AtomicI64::new(0));
    let counter = redirect_count.clone();
    let client = match reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(HTTP_TIMEOUT)
        .redirect(reqwest::redirect::Policy::custom(move |attempt| {
            counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            attempt.follow()
        }))
        .build()
    {
        Ok(c) => c,
        Err(_) => return (None, None, None),
    };

    let started = std::time::Instant::now();
    match client.get(url).send().await {
        Ok(resp) => {
            let status = resp.status().as_u16() as i64;
            let latency_ms = started.elapsed().as_millis() as i64;
            let redirects = redirect_count.load(std::sync::atomic::Ordering::Relaxed);
            (Some(status), Some(latency_ms), Some(redirects))
        }
        Err(_) => (None, None, None),
    }
}

async fn probe_tls(host: &str) -> Option<i64> {
    if host.is_empty() {
        return None;
    }
    let host = host.to_string();
    tokio::time::timeout(TLS_TIMEOUT, tokio::task::spawn_blocking(move || fetch_cert_expiry_blocking(&host)))
        .await
        .ok()?
        .ok()?
}

/// Synchronous cert inspection; run on a blocking thread since `native-tls`
/// has no async handshake API.
fn fetch_cert_expiry_blocking(host: &str) -> Option<i64> {
    use std::net::TcpStream;

    let addr = (host, 443u16).to_socket_addrs().ok()?.next()?;
    let stream = TcpStream::connect_timeout(&addr, TLS_TIMEOUT).ok()?;
    let connector = native_tls::TlsConnector::new().ok()?;
    let tls_stream = connector.connect(host, stream).ok()?;
    let cert = tls_stream.peer_certificate().ok()??;
    let der = cert.to_der().ok()?;
    let (_, parsed) = x509_parser::parse_x509_certificate(&der).ok()?;
    let not_after = parsed.validity().not_after.timestamp();
    let now = chrono::Utc::now().timestamp();
    Some((not_after - now) / 86_400)
}

/// One ICMP echo request/reply, best-effort. Requires CAP_NET_RAW or root
/// on Linux, same precondition as the teacher's raw-socket ICMP listener.
#[cfg(target_os = "linux")]
async fn probe_icmp(host: &str) -> Option<f64> {
    if host.is_empty() {
        return None;
    }
    let host = host.to_string();
    tokio::time::timeout(ICMP_TIMEOUT, tokio::task::spawn_blocking(move || send_echo_blocking(&host)))
        .await
        .ok()?
        .ok()?
}

#[cfg(not(target_os = "linux"))]
async fn probe_icmp(_host: &str) -> Option<f64> {
    None
}

#[cfg(target_os = "linux")]
fn send_echo_blocking(host: &str) -> Option<f64> {
    use socket2::{Domain, Protocol, Socket, Type};
    use std::net::SocketAddr;

    let addr: SocketAddr = (host, 0).to_socket_addrs().ok()?.find(|a| a.is_ipv4())?;
    let socket = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4)).ok()?;
    socket.set_read_timeout(Some(ICMP_TIMEOUT)).ok()?;
    socket.set_write_timeout(Some(ICMP_TIMEOUT)).ok()?;

    let ident = std::process::id() as u16;
    let packet = build_echo_request(ident, 1);
    socket.send_to(&packet, &addr.into()).ok()?;

    let started = std::time::Instant::now();
    let mut buf = [std::mem::MaybeUninit::new(0u8); 512];
    loop {
        if started.elapsed() > ICMP_TIMEOUT {
            return None;
        }
        let (n, _) = socket.recv_from(&mut buf).ok()?;
        let bytes: Vec<u8> = buf[..n].iter().map(|b| unsafe { b.assume_init() }).collect();
        if is_matching_echo_reply(&bytes, ident) {
            let elapsed = started.elapsed();
            return Some((elapsed.as_secs_f64() * 1000.0 * 100.0).round() / 100.0);
        }
    }
}

#[cfg(target_os = "linux")]
fn build_echo_request(ident: u16, seq: u16) -> Vec<u8> {
    let mut packet = vec![0u8; 16];
    packet[0] = 8; // type: echo request
    packet[1] = 0; // code
    packet[4..6].copy_from_slice(&ident.to_be_bytes());
    packet[6..8].copy_from_slice(&seq.to_be_bytes());
    let checksum = icmp_checksum(&packet);
    packet[2..4].copy_from_slice(&checksum.to_be_bytes());
    packet
}

#[cfg(target_os = "linux")]
fn icmp_checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut chunks = data.chunks_exact(2);
    for chunk in &mut chunks {
        sum += u16::from_be_bytes([chunk[0], chunk[1]]) as u32;
    }
    if let [last] = chunks.remainder() {
        sum += (*last as u32) << 8;
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}

/// IPv4 raw sockets hand back the full IP header; the reply's ICMP header
/// starts after it. We only check type/ident, not sequence, since we send
/// exactly one request per call.
#[cfg(target_os = "linux")]
fn is_matching_echo_reply(packet: &[u8], ident: u16) -> bool {
    if packet.len() < 20 + 8 {
        return false;
    }
    let ip_header_len = ((packet[0] & 0x0F) * 4) as usize;
    if packet.len() < ip_header_len + 8 {
        return false;
    }
    let icmp = &packet[ip_header_len..];
    let reply_type = icmp[0];
    let reply_ident = u16::from_be_bytes([icmp[4], icmp[5]]);
    reply_type == 0 && reply_ident == ident
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(target_os = "linux")]
    #[test]
    fn checksum_of_zero_packet_is_all_ones() {
        let packet = vec![0u8; 16];
        assert_eq!(icmp_checksum(&packet), 0xFFFF);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn echo_reply_must_match_our_identifier() {
        let mut packet = vec![0u8; 20 + 8];
        packet[0] = 0x45; // version 4, header len 20
        packet[20] = 0; // echo reply
        packet[24..26].copy_from_slice(&42u16.to_be_bytes());
        assert!(is_matching_echo_reply(&packet, 42));
        assert!(!is_matching_echo_reply(&packet, 43));
    }
}
