//! OSC network adapter
//!
//! Sending covers two targets: absolute values to arbitrary receivers, and
//! relative master broadcasts (typically to a multicast group). Receiving
//! is the slave side: a listener task decodes integer messages and feeds
//! them into the engine channel as input events, so network-driven controls
//! take exactly the same path as GPIO-driven ones.

use std::net::{Ipv4Addr, SocketAddr, UdpSocket};

use anyhow::{Context, Result};
use rosc::{OscMessage, OscPacket, OscType};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::OscPort;
use crate::control::ControlKind;
use crate::error::TargetError;
use crate::gpio::InputEvent;

const URL_SCHEME: &str = "osc.udp://";

/// Accept `osc.udp://host:port` (liblo style) or a bare `host:port`.
pub fn parse_udp_url(url: &str) -> Result<String, TargetError> {
    let rest = url.strip_prefix(URL_SCHEME).unwrap_or(url);
    if rest.contains("://") || rest.is_empty() || !rest.contains(':') {
        return Err(TargetError::BadUrl(url.to_string()));
    }
    Ok(rest.to_string())
}

pub struct OscSender {
    socket: UdpSocket,
}

impl OscSender {
    pub fn new() -> Result<Self, TargetError> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        Ok(Self { socket })
    }
}

impl OscPort for OscSender {
    fn send(&self, url: &str, path: &str, value: i32) -> Result<(), TargetError> {
        let target = parse_udp_url(url)?;
        let packet = OscPacket::Message(OscMessage {
            addr: path.to_string(),
            args: vec![OscType::Int(value)],
        });
        let bytes = rosc::encoder::encode(&packet)?;
        self.socket.send_to(&bytes, target.as_str())?;
        debug!(url, path, value, "OSC message sent");
        Ok(())
    }
}

/// A network-driven control: messages on `path` feed the control occupying
/// the (virtual) `line`.
#[derive(Debug, Clone)]
pub struct SlaveRoute {
    pub path: String,
    pub line: u32,
    pub kind: ControlKind,
}

/// Slave side: a bound socket plus the routes it feeds.
///
/// Binding happens at startup so a bad listen URL is a fatal configuration
/// problem, not a silent background failure.
pub struct OscListener {
    socket: tokio::net::UdpSocket,
    routes: Vec<SlaveRoute>,
}

impl OscListener {
    pub async fn bind(url: &str, routes: Vec<SlaveRoute>) -> Result<Self> {
        let bind = parse_udp_url(url).map_err(|e| anyhow::anyhow!("{e}"))?;
        let socket = tokio::net::UdpSocket::bind(&bind)
            .await
            .with_context(|| format!("binding OSC listener to '{bind}'"))?;
        if let Ok(SocketAddr::V4(addr)) = bind.parse::<SocketAddr>() {
            if addr.ip().is_multicast() {
                socket
                    .join_multicast_v4(*addr.ip(), Ipv4Addr::UNSPECIFIED)
                    .with_context(|| format!("joining multicast group {}", addr.ip()))?;
                debug!(group = %addr.ip(), "joined multicast group");
            }
        }
        info!(%bind, routes = routes.len(), "OSC listener bound");
        Ok(Self { socket, routes })
    }

    /// Listen for integer messages until shutdown.
    ///
    /// Several routes may share one path — multiple local channels reacting
    /// to the same master — so every matching route produces an event.
    /// Rotary routes take the sign of the received quantity as a step
    /// direction; switch routes mirror the received 0/1 as a level.
    pub async fn run(
        self,
        events: mpsc::Sender<InputEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let mut buf = vec![0u8; rosc::decoder::MTU];
        loop {
            tokio::select! {
                received = self.socket.recv_from(&mut buf) => {
                    let (len, _peer) = received.context("receiving OSC packet")?;
                    match rosc::decoder::decode_udp(&buf[..len]) {
                        Ok((_, packet)) => dispatch_packet(packet, &self.routes, &events).await,
                        Err(e) => debug!(error = %e, "undecodable OSC packet ignored"),
                    }
                }
                _ = shutdown.changed() => {
                    info!("OSC listener stopping");
                    break;
                }
            }
        }
        Ok(())
    }
}

async fn dispatch_packet(
    packet: OscPacket,
    routes: &[SlaveRoute],
    events: &mpsc::Sender<InputEvent>,
) {
    match packet {
        OscPacket::Message(msg) => {
            let Some(OscType::Int(value)) = msg.args.first().cloned() else {
                debug!(path = %msg.addr, "OSC message without int argument ignored");
                return;
            };
            for route in routes.iter().filter(|r| r.path == msg.addr) {
                let event = match route.kind {
                    ControlKind::Rotary => InputEvent::Step {
                        line: route.line,
                        delta: value.signum(),
                    },
                    ControlKind::Switch => InputEvent::Level {
                        line: route.line,
                        pressed: value != 0,
                    },
                };
                if events.send(event).await.is_err() {
                    warn!("engine channel closed, dropping network event");
                    return;
                }
            }
        }
        OscPacket::Bundle(bundle) => {
            for packet in bundle.content {
                Box::pin(dispatch_packet(packet, routes, events)).await;
            }
        }
    }
}
