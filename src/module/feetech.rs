// Feetech STS-series serial servo backend
//
// Packet format: [0xFF, 0xFF, ID, Length, Instruction, Params..., Checksum]
//
// The servos close their own velocity and position loops. This module
// speaks the bus protocol and maps the module's units (m, rad) onto raw
// servo ticks.

use std::io::{Read, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serialport::SerialPort;
use tracing::{debug, info, warn};

use super::angle::wrap_into;
use super::config::{ActuatorConfig, IdleMode};
use super::hardware::{AbsoluteSensorHandle, ActuatorHandle, ControlType, HardwareError};

pub const DEFAULT_BAUDRATE: u32 = 1_000_000;
pub const DEFAULT_TIMEOUT_MS: u64 = 100;

/// Encoder resolution of the servo output shaft
pub const TICKS_PER_ROTATION: u16 = 4096;

const HEADER: [u8; 2] = [0xFF, 0xFF];

/// Largest magnitude a sign-magnitude register can carry
const MAX_MAGNITUDE: i32 = 0x7FFF;

/// Raw torque limit for 100% output
const FULL_TORQUE: f64 = 1000.0;

/// Protection current register resolution
const AMPS_PER_CURRENT_UNIT: f64 = 0.0065;

#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub enum Instruction {
    Ping = 0x01,
    Read = 0x02,
    Write = 0x03,
}

/// STS register map (subset used here)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    // EEPROM area, survives power cycles while the lock is set
    MaxTorque = 16,         // 2 bytes, 0..=1000
    PositionP = 21,         // 1 byte
    PositionD = 22,         // 1 byte
    PositionI = 23,         // 1 byte
    ProtectionCurrent = 28, // 2 bytes, 6.5 mA units
    OperatingMode = 33,     // 1 byte

    // RAM area
    TorqueEnable = 40,    // 1 byte: 0=off, 1=on
    GoalPosition = 42,    // 2 bytes, sign-magnitude in step mode
    GoalVelocity = 46,    // 2 bytes, sign-magnitude
    TorqueLimit = 48,     // 2 bytes, 0..=1000
    Lock = 55,            // 1 byte: 0=unlocked, 1=locked
    PresentPosition = 56, // 2 bytes, 0..4096
    PresentVelocity = 58, // 2 bytes, sign-magnitude
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatingMode {
    Position = 0,
    Velocity = 1,
    Pwm = 2,
    Step = 3,
}

#[derive(Debug, thiserror::Error)]
pub enum FeetechError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid response from servo {id}: {reason}")]
    InvalidResponse { id: u8, reason: String },

    #[error("Checksum mismatch for servo {id}")]
    ChecksumMismatch { id: u8 },

    #[error("Servo {id} returned error status: 0x{status:02X}")]
    ServoError { id: u8, status: u8 },

    #[error("Timeout waiting for response from servo {id}")]
    Timeout { id: u8 },
}

pub type Result<T> = std::result::Result<T, FeetechError>;

/// Sum-complement checksum over everything after the header
fn checksum(data: &[u8]) -> u8 {
    let sum: u32 = data.iter().map(|&b| b as u32).sum();
    !(sum as u8)
}

fn build_packet(id: u8, instruction: Instruction, params: &[u8]) -> Vec<u8> {
    let mut packet = Vec::with_capacity(6 + params.len());
    packet.extend_from_slice(&HEADER);
    packet.push(id);
    packet.push((params.len() + 2) as u8); // instruction + params + checksum
    packet.push(instruction as u8);
    packet.extend_from_slice(params);
    packet.push(checksum(&packet[2..]));
    packet
}

/// Bit 15 = sign (1 = negative), bits 0-14 = magnitude
pub fn encode_sign_magnitude(value: i16) -> u16 {
    let magnitude = (value as i32).abs().min(MAX_MAGNITUDE) as u16;
    if value < 0 { 0x8000 | magnitude } else { magnitude }
}

pub fn decode_sign_magnitude(raw: u16) -> i16 {
    let magnitude = (raw & 0x7FFF) as i16;
    if raw & 0x8000 != 0 { -magnitude } else { magnitude }
}

/// Clamp a float into the range a sign-magnitude register can carry
fn saturate_i16(value: f64) -> i16 {
    (value.round() as i32).clamp(-MAX_MAGNITUDE, MAX_MAGNITUDE) as i16
}

/// Half-duplex servo bus over any byte transport
pub struct FeetechBus<P> {
    port: P,
}

impl FeetechBus<Box<dyn SerialPort>> {
    pub fn open(port_name: &str) -> Result<Self> {
        Self::open_with_baudrate(port_name, DEFAULT_BAUDRATE)
    }

    pub fn open_with_baudrate(port_name: &str, baudrate: u32) -> Result<Self> {
        info!("Opening servo bus on {} at {} baud", port_name, baudrate);
        let port = serialport::new(port_name, baudrate)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()?;
        Ok(Self { port })
    }
}

impl<P: Read + Write> FeetechBus<P> {
    pub fn with_transport(port: P) -> Self {
        Self { port }
    }

    fn send(&mut self, id: u8, instruction: Instruction, params: &[u8]) -> Result<()> {
        let packet = build_packet(id, instruction, params);
        self.port.write_all(&packet)?;
        self.port.flush()?;
        Ok(())
    }

    /// Read one status packet and return its parameters
    fn receive(&mut self, expected_id: u8) -> Result<Vec<u8>> {
        let mut head = [0u8; 4];
        self.port.read_exact(&mut head).map_err(|e| match e.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::UnexpectedEof => {
                FeetechError::Timeout { id: expected_id }
            }
            _ => FeetechError::Io(e),
        })?;

        if head[..2] != HEADER {
            return Err(FeetechError::InvalidResponse {
                id: expected_id,
                reason: format!("Invalid header: {:02X?}", &head[..2]),
            });
        }
        let id = head[2];
        if id != expected_id {
            return Err(FeetechError::InvalidResponse {
                id: expected_id,
                reason: format!("ID mismatch: expected {}, got {}", expected_id, id),
            });
        }
        let length = head[3] as usize;
        if length < 2 {
            return Err(FeetechError::InvalidResponse {
                id,
                reason: format!("Length {} too short", length),
            });
        }

        // error status + params + checksum
        let mut body = vec![0u8; length];
        self.port.read_exact(&mut body)?;
        let (payload, received) = body.split_at(length - 1);

        let expected = checksum(&[&head[2..4], payload].concat());
        if expected != received[0] {
            return Err(FeetechError::ChecksumMismatch { id });
        }
        if payload[0] != 0 {
            return Err(FeetechError::ServoError {
                id,
                status: payload[0],
            });
        }
        Ok(payload[1..].to_vec())
    }

    pub fn ping(&mut self, id: u8) -> Result<bool> {
        self.send(id, Instruction::Ping, &[])?;
        match self.receive(id) {
            Ok(_) => Ok(true),
            Err(FeetechError::Timeout { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn write_u8(&mut self, id: u8, register: Register, value: u8) -> Result<()> {
        debug!("Write u8 to servo {}: reg={:?}, value={}", id, register, value);
        self.send(id, Instruction::Write, &[register as u8, value])?;
        self.receive(id)?;
        Ok(())
    }

    pub fn write_u16(&mut self, id: u8, register: Register, value: u16) -> Result<()> {
        debug!("Write u16 to servo {}: reg={:?}, value={}", id, register, value);
        let [lo, hi] = value.to_le_bytes();
        self.send(id, Instruction::Write, &[register as u8, lo, hi])?;
        self.receive(id)?;
        Ok(())
    }

    pub fn write_i16(&mut self, id: u8, register: Register, value: i16) -> Result<()> {
        self.write_u16(id, register, encode_sign_magnitude(value))
    }

    pub fn read_u16(&mut self, id: u8, register: Register) -> Result<u16> {
        self.send(id, Instruction::Read, &[register as u8, 2])?;
        let response = self.receive(id)?;
        match response.as_slice() {
            [lo, hi, ..] => Ok(u16::from_le_bytes([*lo, *hi])),
            _ => Err(FeetechError::InvalidResponse {
                id,
                reason: format!("Expected 2 bytes, got {}", response.len()),
            }),
        }
    }

    pub fn read_i16(&mut self, id: u8, register: Register) -> Result<i16> {
        Ok(decode_sign_magnitude(self.read_u16(id, register)?))
    }

    pub fn set_torque(&mut self, id: u8, enabled: bool) -> Result<()> {
        self.write_u8(id, Register::TorqueEnable, enabled as u8)
    }

    pub fn set_eeprom_lock(&mut self, id: u8, locked: bool) -> Result<()> {
        self.write_u8(id, Register::Lock, locked as u8)
    }
}

/// A bus shared by every device of a module (or a whole chassis)
pub struct SharedBus<P>(Arc<Mutex<FeetechBus<P>>>);

impl<P> Clone for SharedBus<P> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<P: Read + Write> SharedBus<P> {
    pub fn new(bus: FeetechBus<P>) -> Self {
        Self(Arc::new(Mutex::new(bus)))
    }

    pub fn lock(&self) -> MutexGuard<'_, FeetechBus<P>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Unwraps the 12-bit single-turn position into a running tick count.
///
/// Assumes less than half a rotation between two updates.
#[derive(Debug, Clone, Copy, Default)]
struct TurnCounter {
    last_raw: Option<u16>,
    ticks: i64,
}

impl TurnCounter {
    fn update(&mut self, raw: u16) -> i64 {
        let raw = raw % TICKS_PER_ROTATION;
        if let Some(last) = self.last_raw {
            let full = TICKS_PER_ROTATION as i64;
            let mut delta = raw as i64 - last as i64;
            if delta > full / 2 {
                delta -= full;
            } else if delta < -full / 2 {
                delta += full;
            }
            self.ticks += delta;
        }
        self.last_raw = Some(raw);
        self.ticks
    }
}

/// Servo used as a swerve actuator
pub struct FeetechActuator<P> {
    bus: SharedBus<P>,
    id: u8,
    config: Option<ActuatorConfig>,
    counter: TurnCounter,
    // Position (in output units) at tick count zero
    reference: f64,
    torque_enabled: bool,
}

impl<P: Read + Write> FeetechActuator<P> {
    pub fn new(bus: SharedBus<P>, id: u8) -> Self {
        Self {
            bus,
            id,
            config: None,
            counter: TurnCounter::default(),
            reference: 0.0,
            torque_enabled: false,
        }
    }

    fn config(&self) -> std::result::Result<&ActuatorConfig, HardwareError> {
        self.config.as_ref().ok_or_else(|| {
            HardwareError::Unsupported(format!("servo {} used before configuration", self.id))
        })
    }

    /// Output units per tick
    fn units_per_tick(&self) -> std::result::Result<f64, HardwareError> {
        Ok(self.config()?.position_conversion_factor / TICKS_PER_ROTATION as f64)
    }

    fn read_ticks(&mut self) -> std::result::Result<i64, HardwareError> {
        let raw = self.bus.lock().read_u16(self.id, Register::PresentPosition)?;
        Ok(self.counter.update(raw))
    }

    fn write_config(&mut self, config: &ActuatorConfig) -> Result<()> {
        let mut bus = self.bus.lock();
        let id = self.id;

        let mode = match config.mode {
            ControlType::Velocity => OperatingMode::Velocity,
            ControlType::Position => OperatingMode::Step,
        };
        let (low, high) = config.output_range;
        let torque = (low.abs().max(high.abs()).min(1.0) * FULL_TORQUE).round() as u16;
        let current = (config.current_limit_amps / AMPS_PER_CURRENT_UNIT)
            .round()
            .clamp(0.0, u16::MAX as f64) as u16;

        // Mode and EEPROM parameters only change with torque off
        bus.set_torque(id, false)?;
        if config.persist {
            bus.set_eeprom_lock(id, false)?;
        }
        bus.write_u8(id, Register::OperatingMode, mode as u8)?;
        for (register, value) in [
            (Register::PositionP, config.pid.p),
            (Register::PositionI, config.pid.i),
            (Register::PositionD, config.pid.d),
        ] {
            match gain_register(value) {
                Some(raw) => bus.write_u8(id, register, raw)?,
                None => warn!(
                    "Servo {}: {:?} gain {} below register resolution, kept firmware value",
                    id, register, value
                ),
            }
        }
        bus.write_u16(id, Register::MaxTorque, torque)?;
        bus.write_u16(id, Register::ProtectionCurrent, current)?;
        if config.persist {
            bus.set_eeprom_lock(id, true)?;
        }
        bus.write_u16(id, Register::TorqueLimit, torque)?;

        // Brake holds the output right away, coast waits for the first setpoint
        let hold = config.idle_mode == IdleMode::Brake;
        if hold {
            bus.set_torque(id, true)?;
        }
        self.torque_enabled = hold;
        Ok(())
    }

    fn ensure_torque(&mut self) -> Result<()> {
        if !self.torque_enabled {
            debug!("Enabling torque on servo {}", self.id);
            self.bus.lock().set_torque(self.id, true)?;
            self.torque_enabled = true;
        }
        Ok(())
    }
}

/// Raw PID register value for a gain.
///
/// The registers hold integer firmware coefficients. A positive gain that
/// rounds to zero would disable the loop term, so `None` is returned and the
/// firmware's own coefficient is kept.
fn gain_register(gain: f64) -> Option<u8> {
    let raw = gain.round().clamp(0.0, u8::MAX as f64) as u8;
    if raw == 0 && gain > 0.0 { None } else { Some(raw) }
}

impl<P: Read + Write> ActuatorHandle for FeetechActuator<P> {
    fn apply_configuration(
        &mut self,
        config: &ActuatorConfig,
    ) -> std::result::Result<(), HardwareError> {
        if config.position_conversion_factor == 0.0 || config.velocity_conversion_factor == 0.0 {
            return Err(HardwareError::Unsupported(
                "conversion factors must be non-zero".to_string(),
            ));
        }

        match self.bus.lock().ping(self.id) {
            Ok(true) => {}
            Ok(false) => return Err(HardwareError::Unreachable { id: self.id }),
            Err(e) => return Err(e.into()),
        }

        info!("Configuring servo {} for {:?} control", self.id, config.mode);
        self.torque_enabled = false;
        self.write_config(config)?;
        self.config = Some(*config);
        Ok(())
    }

    fn set_setpoint(
        &mut self,
        value: f64,
        mode: ControlType,
    ) -> std::result::Result<(), HardwareError> {
        let config = *self.config()?;
        if mode != config.mode {
            return Err(HardwareError::Rejected {
                id: self.id,
                reason: format!("configured for {:?}, got {:?} setpoint", config.mode, mode),
            });
        }
        self.ensure_torque()?;

        match mode {
            ControlType::Velocity => {
                // units/s -> RPM -> ticks/s
                let rpm = value / config.velocity_conversion_factor;
                let ticks = saturate_i16(rpm * TICKS_PER_ROTATION as f64 / 60.0);
                self.bus
                    .lock()
                    .write_i16(self.id, Register::GoalVelocity, ticks)?;
            }
            ControlType::Position => {
                // Step mode moves relative to where the servo is now
                let current = self.position()?;
                let delta = match config.position_wrapping {
                    Some(wrap) => {
                        let half = wrap.span() / 2.0;
                        wrap_into(value - current, -half, half)
                    }
                    None => value - current,
                };
                let steps = saturate_i16(delta / self.units_per_tick()?);
                self.bus
                    .lock()
                    .write_i16(self.id, Register::GoalPosition, steps)?;
            }
        }
        Ok(())
    }

    fn position(&mut self) -> std::result::Result<f64, HardwareError> {
        let ticks = self.read_ticks()?;
        Ok(self.reference + ticks as f64 * self.units_per_tick()?)
    }

    fn velocity(&mut self) -> std::result::Result<f64, HardwareError> {
        let config = *self.config()?;
        let ticks = self.bus.lock().read_i16(self.id, Register::PresentVelocity)?;
        let rpm = ticks as f64 * 60.0 / TICKS_PER_ROTATION as f64;
        Ok(rpm * config.velocity_conversion_factor)
    }

    fn set_position(&mut self, value: f64) -> std::result::Result<(), HardwareError> {
        let ticks = self.read_ticks()?;
        self.reference = value - ticks as f64 * self.units_per_tick()?;
        Ok(())
    }
}

/// Absolute angle taken from a servo's single-turn position
pub struct FeetechAbsoluteSensor<P> {
    bus: SharedBus<P>,
    id: u8,
}

impl<P: Read + Write> FeetechAbsoluteSensor<P> {
    pub fn new(bus: SharedBus<P>, id: u8) -> Self {
        Self { bus, id }
    }
}

impl<P: Read + Write> AbsoluteSensorHandle for FeetechAbsoluteSensor<P> {
    fn absolute_rotations(&mut self) -> std::result::Result<f64, HardwareError> {
        let raw = self.bus.lock().read_u16(self.id, Register::PresentPosition)?;
        Ok((raw % TICKS_PER_ROTATION) as f64 / TICKS_PER_ROTATION as f64)
    }
}
