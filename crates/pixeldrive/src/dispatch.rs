//! Open Pixel Control dispatch.
//!
//! Each output channel is one TCP endpoint (a lighting controller) with its
//! own background task owning the socket. The frame loop never touches the
//! network: it serializes a channel's colors into a length-prefixed frame
//! and publishes it through a latest-value channel; the connection task
//! writes whatever is newest whenever the socket is up. A channel that is
//! down silently drops frames and keeps retrying on its own cadence, and a
//! hung or broken channel never stalls its siblings or the frame loop.
//!
//! Wire format, per frame: a 4-byte header (channel byte, reserved 0;
//! command byte; big-endian payload length) followed by the payload. Command
//! 0x00 sets pixel colors, 3 bytes (R, G, B) per pixel in mesh wire order.
//! Command 0xFF carries system-exclusive config blocks: the firmware flag
//! byte (dithering / interpolation / status LED) and the color-correction
//! JSON, sent on every (re)connection and whenever a setting changes.

use std::fmt;
use std::time::Duration;

use anyhow::{bail, Result};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::sleep;

use crate::mesh::Mesh;
use crate::pixel::MeshPixel;

pub const DEFAULT_OPC_PORT: u16 = 7890;

const RECONNECT_INTERVAL: Duration = Duration::from_millis(500);

const CMD_SET_COLORS: u8 = 0x00;
const CMD_SYSEX: u8 = 0xFF;
const SYSEX_SYSTEM_ID: u16 = 0x0001;
const SYSEX_CMD_COLOR_CORRECTION: u16 = 0x0001;
const SYSEX_CMD_FIRMWARE_CONFIG: u16 = 0x0002;

const FIRMWARE_DISABLE_DITHERING: u8 = 0x01;
const FIRMWARE_DISABLE_INTERPOLATION: u8 = 0x02;
const FIRMWARE_MANUAL_LED: u8 = 0x04;
const FIRMWARE_LED_ON: u8 = 0x08;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpcEndpoint {
    pub host: String,
    pub port: u16,
}

impl OpcEndpoint {
    pub fn new(host: &str, port: u16) -> OpcEndpoint {
        OpcEndpoint {
            host: host.to_owned(),
            port,
        }
    }
}

impl fmt::Display for OpcEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Controller-side configuration delivered through sysex frames.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceSettings {
    firmware_flags: u8,
    color_correction: Option<String>,
}

impl DeviceSettings {
    /// Dithering jitters between adjacent 8-bit levels to fake extra color
    /// depth; on by default in the controller firmware.
    pub fn set_dithering(&mut self, enabled: bool) {
        if enabled {
            self.firmware_flags &= !FIRMWARE_DISABLE_DITHERING;
        } else {
            self.firmware_flags |= FIRMWARE_DISABLE_DITHERING;
        }
    }

    /// Frame interpolation blends consecutive frames in hardware; on by
    /// default in the controller firmware.
    pub fn set_interpolation(&mut self, enabled: bool) {
        if enabled {
            self.firmware_flags &= !FIRMWARE_DISABLE_INTERPOLATION;
        } else {
            self.firmware_flags |= FIRMWARE_DISABLE_INTERPOLATION;
        }
    }

    /// Take manual control of the controller's status LED.
    pub fn set_status_led(&mut self, on: bool) {
        self.firmware_flags |= FIRMWARE_MANUAL_LED;
        if on {
            self.firmware_flags |= FIRMWARE_LED_ON;
        } else {
            self.firmware_flags &= !FIRMWARE_LED_ON;
        }
    }

    /// Return the status LED to firmware control.
    pub fn status_led_auto(&mut self) {
        self.firmware_flags &= !(FIRMWARE_MANUAL_LED | FIRMWARE_LED_ON);
    }

    pub fn set_color_correction(&mut self, gamma: f64, red: f64, green: f64, blue: f64) {
        self.color_correction = Some(
            serde_json::json!({ "gamma": gamma, "whitepoint": [red, green, blue] }).to_string(),
        );
    }

    fn sysex_packets(&self) -> Vec<u8> {
        let mut out = Vec::new();
        if let Some(cc) = &self.color_correction {
            push_sysex(&mut out, SYSEX_CMD_COLOR_CORRECTION, cc.as_bytes());
        }
        push_sysex(
            &mut out,
            SYSEX_CMD_FIRMWARE_CONFIG,
            &[self.firmware_flags],
        );
        out
    }
}

fn push_sysex(out: &mut Vec<u8>, command: u16, content: &[u8]) {
    let len = (content.len() + 4) as u16;
    out.push(0);
    out.push(CMD_SYSEX);
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(&SYSEX_SYSTEM_ID.to_be_bytes());
    out.extend_from_slice(&command.to_be_bytes());
    out.extend_from_slice(content);
}

/// Serialize a set-colors frame: 4-byte header plus 3 bytes per pixel.
pub fn set_colors_packet(colors: &[u32]) -> Vec<u8> {
    let payload = 3 * colors.len();
    let mut packet = vec![0u8; 4 + payload];
    fill_colors_packet(&mut packet, colors);
    packet
}

fn fill_colors_packet(packet: &mut [u8], colors: &[u32]) {
    debug_assert_eq!(packet.len(), 4 + 3 * colors.len());
    let payload = (3 * colors.len()) as u16;
    packet[0] = 0;
    packet[1] = CMD_SET_COLORS;
    packet[2..4].copy_from_slice(&payload.to_be_bytes());
    let mut offset = 4;
    for &c in colors {
        packet[offset] = (c >> 16) as u8;
        packet[offset + 1] = (c >> 8) as u8;
        packet[offset + 2] = c as u8;
        offset += 3;
    }
}

/// One output channel: the frame-side handle paired with a background
/// connection task.
pub struct OpcChannel {
    endpoint: OpcEndpoint,
    packet: Vec<u8>,
    frames: watch::Sender<Vec<u8>>,
    settings: watch::Sender<DeviceSettings>,
}

impl OpcChannel {
    /// Spawns the connection task; must be called within a tokio runtime.
    pub fn new(endpoint: OpcEndpoint, pixel_count: usize) -> OpcChannel {
        let (frames, frames_rx) = watch::channel(Vec::new());
        let (settings, settings_rx) = watch::channel(DeviceSettings::default());
        tokio::spawn(run_connection(endpoint.clone(), frames_rx, settings_rx));
        OpcChannel {
            endpoint,
            packet: set_colors_packet(&vec![0u32; pixel_count]),
            frames,
            settings,
        }
    }

    pub fn endpoint(&self) -> &OpcEndpoint {
        &self.endpoint
    }

    /// Publish one frame of colors. Non-blocking; if the connection is down
    /// the frame is simply dropped in favor of whatever comes next.
    pub fn dispatch(&mut self, colors: &[u32]) {
        debug_assert_eq!(4 + 3 * colors.len(), self.packet.len());
        fill_colors_packet(&mut self.packet, colors);
        self.frames.send_replace(self.packet.clone());
    }

    /// Update controller settings; the new sysex blocks go out immediately
    /// if connected, and again on every reconnect.
    pub fn update_settings(&self, apply: impl FnOnce(&mut DeviceSettings)) {
        self.settings.send_modify(apply);
    }
}

async fn run_connection(
    endpoint: OpcEndpoint,
    mut frames: watch::Receiver<Vec<u8>>,
    mut settings: watch::Receiver<DeviceSettings>,
) {
    let mut failed_already = false;
    loop {
        let mut stream = match TcpStream::connect((endpoint.host.as_str(), endpoint.port)).await {
            Ok(stream) => {
                let _ = stream.set_nodelay(true);
                tracing::info!(endpoint = %endpoint, "OPC endpoint connected");
                failed_already = false;
                stream
            }
            Err(e) => {
                if !failed_already {
                    tracing::warn!(endpoint = %endpoint, error = %e, "OPC connect failed; retrying");
                    failed_already = true;
                }
                sleep(RECONNECT_INTERVAL).await;
                continue;
            }
        };

        // Config first, so the controller is set up before pixel data; the
        // pending frame (if any) follows from the select loop.
        let packets = settings.borrow_and_update().sysex_packets();
        if let Err(e) = stream.write_all(&packets).await {
            tracing::warn!(endpoint = %endpoint, error = %e, "OPC endpoint dropped");
            sleep(RECONNECT_INTERVAL).await;
            continue;
        }

        loop {
            tokio::select! {
                changed = frames.changed() => {
                    if changed.is_err() {
                        return; // dispatcher dropped; nothing left to send
                    }
                    let frame = frames.borrow_and_update().clone();
                    if frame.is_empty() {
                        continue;
                    }
                    if let Err(e) = stream.write_all(&frame).await {
                        tracing::warn!(endpoint = %endpoint, error = %e, "OPC endpoint dropped");
                        break;
                    }
                }
                changed = settings.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    let packets = settings.borrow_and_update().sysex_packets();
                    if let Err(e) = stream.write_all(&packets).await {
                        tracing::warn!(endpoint = %endpoint, error = %e, "OPC endpoint dropped");
                        break;
                    }
                }
            }
        }

        sleep(RECONNECT_INTERVAL).await;
    }
}

/// Fans a mesh's color state out to its channels. Buffers are sized exactly
/// once, after mesh membership is final.
pub struct Dispatcher {
    channels: Vec<OpcChannel>,
    buffers: Vec<Vec<u32>>,
}

impl Dispatcher {
    pub fn new<P: MeshPixel + 'static>(
        mesh: &Mesh<P>,
        endpoints: Vec<OpcEndpoint>,
    ) -> Result<Dispatcher> {
        if endpoints.len() != mesh.channel_count() {
            bail!(
                "mesh has {} channels but {} endpoints were configured",
                mesh.channel_count(),
                endpoints.len()
            );
        }
        let sizes = mesh.channel_sizes().to_vec();
        let channels = endpoints
            .into_iter()
            .zip(&sizes)
            .map(|(ep, &n)| OpcChannel::new(ep, n))
            .collect();
        let buffers = sizes.iter().map(|&n| vec![0u32; n]).collect();
        Ok(Dispatcher { channels, buffers })
    }

    /// Ship the mesh's current colors, one frame per channel, in wire
    /// order. Never blocks and never fails; down channels drop the frame.
    pub fn dispatch<P: MeshPixel + 'static>(&mut self, mesh: &Mesh<P>) {
        mesh.fill_channel_buffers(&mut self.buffers);
        for (channel, buffer) in self.channels.iter_mut().zip(&self.buffers) {
            channel.dispatch(buffer);
        }
    }

    pub fn channels(&self) -> &[OpcChannel] {
        &self.channels
    }

    pub fn channel(&self, index: usize) -> &OpcChannel {
        &self.channels[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixel::PixelLocation;
    use crate::transform::identity;
    use glam::DVec2;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;
    use tokio::time::timeout;

    struct WiredPixel {
        xy: DVec2,
        ch: usize,
    }

    impl MeshPixel for WiredPixel {
        fn location(&self) -> PixelLocation {
            PixelLocation::Real(self.xy)
        }
        fn channel(&self) -> usize {
            self.ch
        }
    }

    fn mesh(channels: usize, per_channel: usize) -> Mesh<WiredPixel> {
        let mut pixels = Vec::new();
        for ch in 0..channels {
            for i in 0..per_channel {
                pixels.push(WiredPixel {
                    xy: DVec2::new(i as f64, ch as f64),
                    ch,
                });
            }
        }
        Mesh::new(pixels, channels, 1.0, 0.1, identity(), None, None).unwrap()
    }

    #[test]
    fn set_colors_frame_layout() {
        let colors = [crate::color::pack(1, 2, 3), crate::color::pack(4, 5, 6)];
        let packet = set_colors_packet(&colors);
        assert_eq!(packet.len(), 4 + 3 * 2);
        assert_eq!(&packet[..4], &[0, 0, 0, 6]);
        assert_eq!(&packet[4..], &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn frame_length_field_is_big_endian() {
        let colors = vec![0u32; 300];
        let packet = set_colors_packet(&colors);
        assert_eq!(packet.len(), 4 + 900);
        assert_eq!(u16::from_be_bytes([packet[2], packet[3]]), 900);
    }

    #[test]
    fn firmware_sysex_block() {
        let mut settings = DeviceSettings::default();
        settings.set_dithering(false);
        settings.set_interpolation(true);
        let packets = settings.sysex_packets();
        assert_eq!(packets, vec![0, 0xFF, 0, 5, 0, 1, 0, 2, 0x01]);
    }

    #[test]
    fn color_correction_sysex_block() {
        let mut settings = DeviceSettings::default();
        settings.set_color_correction(2.2, 1.0, 1.0, 0.9);
        let packets = settings.sysex_packets();
        // color correction first, then the firmware flags
        assert_eq!(packets[1], 0xFF);
        let len = u16::from_be_bytes([packets[2], packets[3]]) as usize;
        let content = &packets[8..4 + len];
        let parsed: serde_json::Value = serde_json::from_slice(content).unwrap();
        assert_eq!(parsed["gamma"], 2.2);
        assert_eq!(parsed["whitepoint"][2], 0.9);
        let rest = &packets[4 + len..];
        assert_eq!(rest, &[0, 0xFF, 0, 5, 0, 1, 0, 2, 0x00]);
    }

    #[tokio::test]
    async fn dispatch_reaches_connected_endpoint() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let mesh = mesh(1, 4);
        let mut dispatcher = Dispatcher::new(
            &mesh,
            vec![OpcEndpoint::new("127.0.0.1", addr.port())],
        )
        .unwrap();

        let (mut sock, _) = listener.accept().await.unwrap();
        // firmware config flushed on connect
        let mut sysex = [0u8; 9];
        timeout(Duration::from_secs(5), sock.read_exact(&mut sysex))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&sysex[..4], &[0, 0xFF, 0, 5]);

        dispatcher.dispatch(&mesh);
        let mut frame = [0u8; 4 + 12];
        timeout(Duration::from_secs(5), sock.read_exact(&mut frame))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&frame[..4], &[0, 0, 0, 12]);
    }

    #[tokio::test]
    async fn dead_channel_does_not_stall_siblings() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let live = listener.local_addr().unwrap();
        // a port with nothing listening behind it
        let dead = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead_port = dead.local_addr().unwrap().port();
        drop(dead);

        let mut mesh = mesh(2, 2);
        for i in 0..mesh.len() {
            mesh.set_color(i, i as u32);
        }
        let mut dispatcher = Dispatcher::new(
            &mesh,
            vec![
                OpcEndpoint::new("127.0.0.1", live.port()),
                OpcEndpoint::new("127.0.0.1", dead_port),
            ],
        )
        .unwrap();

        let (mut sock, _) = listener.accept().await.unwrap();
        let mut sysex = [0u8; 9];
        timeout(Duration::from_secs(5), sock.read_exact(&mut sysex))
            .await
            .unwrap()
            .unwrap();

        // dispatching with one channel down completes and feeds the other
        dispatcher.dispatch(&mesh);
        let mut frame = [0u8; 4 + 6];
        timeout(Duration::from_secs(5), sock.read_exact(&mut frame))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&frame[..4], &[0, 0, 0, 6]);
        assert_eq!(&frame[4..], &[0, 0, 0, 0, 0, 1]);
    }
}
