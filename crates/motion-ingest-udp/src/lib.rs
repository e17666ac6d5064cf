use anyhow::Context;
use tokio::net::UdpSocket;
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;
use tracing::{debug, info};
use motion_ingest_core::*;

#[derive(Clone, Debug)]
pub struct UdpSensorConfig {
    pub bind_addr: String,       // e.g. "0.0.0.0:47800"
}

impl Default for UdpSensorConfig {
    fn default() -> Self {
        Self { bind_addr: "0.0.0.0:47800".into() }
    }
}

pub struct UdpSensorSource {
    cfg: UdpSensorConfig
}

impl UdpSensorSource {
    pub fn new(cfg: UdpSensorConfig) -> Self { Self { cfg } }
}

#[async_trait::async_trait]
impl SensorSource for UdpSensorSource {
    async fn run(&self, tx: SensorTx) -> Result<(), IngestError> {
        let socket = UdpSocket::bind(&self.cfg.bind_addr).await
            .with_context(|| format!("bind {}", self.cfg.bind_addr))?;
        info!("listening for sensor datagrams on {}", self.cfg.bind_addr);
        let mut buf = vec![0u8; 256];
        loop {
            let (len, peer) = socket.recv_from(&mut buf).await?;
            match parse_packet(&buf[..len]) {
                Some(event) => {
                    if tx.send(event).is_err() {
                        info!("sensor receiver dropped, stopping UDP source");
                        return Ok(());
                    }
                }
                None => debug!("dropping malformed {len}-byte datagram from {peer}"),
            }
        }
    }
}

// Datagram kinds. All numeric fields are little endian.
const PACKET_ACCEL: u8 = 0x01;    // f32 x, y, z; u64 ts
const PACKET_LOCATION: u8 = 0x02; // f64 lat, lon; f32 accuracy; u8 source; u64 ts
const PACKET_ROTATION: u8 = 0x03; // f32 alpha, beta, gamma; u64 ts

const ACCEL_LEN: usize = 1 + 12 + 8;
const LOCATION_LEN: usize = 1 + 16 + 4 + 1 + 8;
const ROTATION_LEN: usize = 1 + 12 + 8;

/// Decodes one datagram. Truncated, unknown or non-finite packets yield
/// `None`.
pub fn parse_packet(buf: &[u8]) -> Option<SensorEvent> {
    decode(buf).filter(SensorEvent::is_valid)
}

fn decode(buf: &[u8]) -> Option<SensorEvent> {
    let (&kind, body) = buf.split_first()?;
    let mut c = Cursor::new(body);
    match kind {
        PACKET_ACCEL if buf.len() >= ACCEL_LEN => {
            let x = c.read_f32::<LittleEndian>().ok()? as f64;
            let y = c.read_f32::<LittleEndian>().ok()? as f64;
            let z = c.read_f32::<LittleEndian>().ok()? as f64;
            let ts = c.read_u64::<LittleEndian>().ok()?;
            Some(SensorEvent::Acceleration(AccelerationSample::new(x, y, z, ts)))
        }
        PACKET_LOCATION if buf.len() >= LOCATION_LEN => {
            let latitude = c.read_f64::<LittleEndian>().ok()?;
            let longitude = c.read_f64::<LittleEndian>().ok()?;
            let accuracy = c.read_f32::<LittleEndian>().ok()? as f64;
            let source = LocationSource::from_byte(c.read_u8().ok()?);
            let timestamp_ms = c.read_u64::<LittleEndian>().ok()?;
            Some(SensorEvent::Location(LocationFix { latitude, longitude, accuracy, source, timestamp_ms }))
        }
        PACKET_ROTATION if buf.len() >= ROTATION_LEN => {
            let alpha = c.read_f32::<LittleEndian>().ok()? as f64;
            let beta = c.read_f32::<LittleEndian>().ok()? as f64;
            let gamma = c.read_f32::<LittleEndian>().ok()? as f64;
            let timestamp_ms = c.read_u64::<LittleEndian>().ok()?;
            Some(SensorEvent::Rotation(RotationSample { alpha, beta, gamma, timestamp_ms }))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;

    fn accel_packet(x: f32, y: f32, z: f32, ts: u64) -> Vec<u8> {
        let mut v = vec![PACKET_ACCEL];
        v.write_f32::<LittleEndian>(x).unwrap();
        v.write_f32::<LittleEndian>(y).unwrap();
        v.write_f32::<LittleEndian>(z).unwrap();
        v.write_u64::<LittleEndian>(ts).unwrap();
        v
    }

    #[test]
    fn test_parse_accel_packet() {
        let pkt = accel_packet(0.5, -1.0, 0.25, 1234);
        match parse_packet(&pkt) {
            Some(SensorEvent::Acceleration(s)) => {
                assert_eq!(s.timestamp_ms, 1234);
                assert_eq!(s.y, -1.0);
                assert!((s.magnitude - (0.25f64 + 1.0 + 0.0625).sqrt()).abs() < 1e-9);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_location_packet() {
        let mut v = vec![PACKET_LOCATION];
        v.write_f64::<LittleEndian>(48.1).unwrap();
        v.write_f64::<LittleEndian>(11.6).unwrap();
        v.write_f32::<LittleEndian>(5.0).unwrap();
        v.write_u8(1).unwrap();
        v.write_u64::<LittleEndian>(99).unwrap();
        match parse_packet(&v) {
            Some(SensorEvent::Location(f)) => {
                assert_eq!(f.source, LocationSource::Gps);
                assert_eq!(f.timestamp_ms, 99);
                assert_eq!(f.latitude, 48.1);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_truncated_and_unknown_packets_are_dropped() {
        let pkt = accel_packet(0.0, 0.0, 0.0, 1);
        assert!(parse_packet(&pkt[..pkt.len() - 1]).is_none());
        assert!(parse_packet(&[]).is_none());
        assert!(parse_packet(&[0x7f, 0, 0, 0]).is_none());
    }

    fn rotation_packet(alpha: f32, beta: f32, gamma: f32, ts: u64) -> Vec<u8> {
        let mut v = vec![PACKET_ROTATION];
        v.write_f32::<LittleEndian>(alpha).unwrap();
        v.write_f32::<LittleEndian>(beta).unwrap();
        v.write_f32::<LittleEndian>(gamma).unwrap();
        v.write_u64::<LittleEndian>(ts).unwrap();
        v
    }

    #[test]
    fn test_non_finite_accel_is_rejected() {
        let pkt = accel_packet(f32::NAN, 0.0, 0.0, 1);
        assert!(parse_packet(&pkt).is_none());
    }

    #[test]
    fn test_non_finite_rotation_is_rejected() {
        assert!(parse_packet(&rotation_packet(f32::NAN, 0.0, 0.0, 1)).is_none());
        assert!(parse_packet(&rotation_packet(0.0, f32::INFINITY, 0.0, 1)).is_none());
        assert!(matches!(
            parse_packet(&rotation_packet(1.0, 2.0, 3.0, 1)),
            Some(SensorEvent::Rotation(_))
        ));
    }

    #[test]
    fn test_non_finite_accuracy_is_rejected() {
        let mut v = vec![PACKET_LOCATION];
        v.write_f64::<LittleEndian>(48.1).unwrap();
        v.write_f64::<LittleEndian>(11.6).unwrap();
        v.write_f32::<LittleEndian>(f32::NAN).unwrap();
        v.write_u8(1).unwrap();
        v.write_u64::<LittleEndian>(99).unwrap();
        assert!(parse_packet(&v).is_none());
    }
}
