// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains a minimal Modbus TCP client which can read holding registers.
//!
//! The robot controller acts as a Modbus TCP server on port 502 with 0-based addressing.
use std::time::Duration;

use bincode::Options;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::exception::{SentryException, SentryResult};
use crate::network::Network;
use crate::telemetry::RegisterSource;

/// Size of the MBAP header in bytes
pub const MBAP_HEADER_SIZE: usize = 7;
const PROTOCOL_ID: u16 = 0;
const EXCEPTION_FLAG: u8 = 0x80;
/// Maximum number of registers a single read may request
pub const MAX_QUANTITY: u16 = 125;

#[derive(Serialize_repr, Deserialize_repr, Debug, Copy, Clone, PartialEq, FromPrimitive)]
#[repr(u8)]
pub enum FunctionCode {
    ReadHoldingRegisters = 0x03,
}

/// Exception codes a Modbus server may answer with.
#[derive(Debug, Copy, Clone, PartialEq, FromPrimitive)]
#[repr(u8)]
pub enum ExceptionCode {
    IllegalFunction = 0x01,
    IllegalDataAddress = 0x02,
    IllegalDataValue = 0x03,
    ServerDeviceFailure = 0x04,
    Acknowledge = 0x05,
    ServerDeviceBusy = 0x06,
    GatewayPathUnavailable = 0x0a,
    GatewayTargetDeviceFailedToRespond = 0x0b,
}

/// Modbus application protocol header
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
pub struct MbapHeader {
    pub transaction_id: u16,
    pub protocol_id: u16,
    /// number of following bytes, including the unit id
    pub length: u16,
    pub unit_id: u8,
}

#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
pub struct ReadHoldingRegistersRequest {
    pub header: MbapHeader,
    pub function: FunctionCode,
    pub start_address: u16,
    pub quantity: u16,
}

impl ReadHoldingRegistersRequest {
    pub fn new(transaction_id: u16, unit_id: u8, start_address: u16, quantity: u16) -> Self {
        ReadHoldingRegistersRequest {
            header: MbapHeader {
                transaction_id,
                protocol_id: PROTOCOL_ID,
                length: 6,
                unit_id,
            },
            function: FunctionCode::ReadHoldingRegisters,
            start_address,
            quantity,
        }
    }
}

fn wire_format() -> impl Options {
    bincode::DefaultOptions::new()
        .with_big_endian()
        .with_fixint_encoding()
}

fn serialize<T: Serialize>(s: &T) -> SentryResult<Vec<u8>> {
    wire_format()
        .serialize(s)
        .map_err(|e| SentryException::ModbusException {
            message: e.to_string(),
        })
}

fn deserialize<'a, T: Deserialize<'a>>(encoded: &'a [u8]) -> SentryResult<T> {
    wire_format()
        .deserialize(encoded)
        .map_err(|e| SentryException::ModbusException {
            message: e.to_string(),
        })
}

fn modbus_exception(message: String) -> SentryException {
    SentryException::ModbusException { message }
}

/// Checks the header of a response against the request it answers.
/// # Return
/// Number of bytes following the header.
pub fn check_response_header(
    header: &MbapHeader,
    request: &ReadHoldingRegistersRequest,
) -> SentryResult<usize> {
    if header.transaction_id != request.header.transaction_id {
        return Err(modbus_exception(format!(
            "ursentry: response to transaction {} while waiting for {}",
            header.transaction_id, request.header.transaction_id
        )));
    }
    if header.protocol_id != PROTOCOL_ID {
        return Err(modbus_exception(format!(
            "ursentry: unknown protocol id {}",
            header.protocol_id
        )));
    }
    if header.length < 3 {
        return Err(modbus_exception(format!(
            "ursentry: response too short ({} bytes)",
            header.length
        )));
    }
    Ok(header.length as usize - 1)
}

/// Checks the PDU of a response (function code, byte count, register data).
pub fn check_response_pdu(pdu: &[u8], request: &ReadHoldingRegistersRequest) -> SentryResult<()> {
    let function = pdu[0];
    if function & EXCEPTION_FLAG != 0 {
        return Err(match ExceptionCode::from_u8(pdu[1]) {
            Some(code) => modbus_exception(format!(
                "ursentry: server answered reading {} with {:?}",
                request.start_address, code
            )),
            None => modbus_exception(format!(
                "ursentry: server answered reading {} with unknown exception {}",
                request.start_address, pdu[1]
            )),
        });
    }
    if FunctionCode::from_u8(function) != Some(request.function) {
        return Err(modbus_exception(format!(
            "ursentry: unexpected function code {} in response",
            function
        )));
    }
    let byte_count = pdu[1] as usize;
    if byte_count != 2 * request.quantity as usize || pdu.len() != 2 + byte_count {
        return Err(modbus_exception(format!(
            "ursentry: expected {} registers but got {} bytes",
            request.quantity, byte_count
        )));
    }
    Ok(())
}

/// Reads holding registers from a Modbus TCP server.
///
/// A read which fails with a [`NetworkException`](`crate::exception::SentryException::NetworkException`)
/// closes the connection, the next read connects again.
pub struct ModbusTcp {
    network: Option<Network>,
    address: String,
    port: u16,
    timeout: Duration,
    unit_id: u8,
    transaction_id: u16,
    reconnects: u64,
}

impl ModbusTcp {
    /// Connects to a Modbus TCP server.
    /// # Arguments
    /// * `address` - IP/hostname of the robot
    /// * `port` - Modbus port, 502 on the UR controller
    /// * `unit_id` - unit identifier sent with every request
    /// * `timeout` - timeout of a single request
    /// # Errors
    /// * [`NetworkException`](`crate::exception::SentryException::NetworkException`) if the
    /// connection cannot be established.
    pub fn new(address: &str, port: u16, unit_id: u8, timeout: Duration) -> SentryResult<Self> {
        Ok(ModbusTcp {
            network: Some(Network::new(address, port, timeout)?),
            address: address.to_string(),
            port,
            timeout,
            unit_id,
            transaction_id: 0,
            reconnects: 0,
        })
    }

    /// Reads `quantity` registers starting at `address`.
    /// # Return
    /// The complete response frame, the register data starts at
    /// [`REGISTER_DATA_OFFSET`](`crate::telemetry::registers::REGISTER_DATA_OFFSET`).
    /// # Errors
    /// * [`NetworkException`](`crate::exception::SentryException::NetworkException`) on
    /// connection loss, timeout or if reconnecting failed.
    /// * [`ModbusException`](`crate::exception::SentryException::ModbusException`) if the server
    /// answered with an exception or an unexpected frame.
    pub fn read_registers(&mut self, address: u16, quantity: u16) -> SentryResult<Vec<u8>> {
        if quantity == 0 || quantity > MAX_QUANTITY {
            return Err(modbus_exception(format!(
                "ursentry: cannot read {} registers at once",
                quantity
            )));
        }
        self.transaction_id = self.transaction_id.wrapping_add(1);
        let request =
            ReadHoldingRegistersRequest::new(self.transaction_id, self.unit_id, address, quantity);
        let result = self.exchange(&request);
        if let Err(SentryException::NetworkException { .. }) = result {
            self.network = None;
        }
        result
    }

    /// Number of times the connection was established again after it was lost.
    pub fn reconnects(&self) -> u64 {
        self.reconnects
    }

    pub fn is_connected(&self) -> bool {
        self.network.is_some()
    }

    fn exchange(&mut self, request: &ReadHoldingRegistersRequest) -> SentryResult<Vec<u8>> {
        let network = self.connection()?;
        // answers to timed out requests would be taken for the answer to this one
        network.drain()?;
        network.tcp_send(&serialize(request)?)?;

        let mut frame = network.tcp_blocking_receive(MBAP_HEADER_SIZE)?;
        let header: MbapHeader = deserialize(&frame)?;
        let remaining = check_response_header(&header, request)?;
        let pdu = network.tcp_blocking_receive(remaining)?;
        check_response_pdu(&pdu, request)?;
        frame.extend_from_slice(&pdu);
        Ok(frame)
    }

    fn connection(&mut self) -> SentryResult<&mut Network> {
        let network = match self.network.take() {
            Some(network) => network,
            None => {
                log::info!(
                    "reconnecting to Modbus server {}:{}",
                    self.address,
                    self.port
                );
                let network = Network::new(&self.address, self.port, self.timeout)?;
                self.reconnects += 1;
                network
            }
        };
        Ok(self.network.insert(network))
    }
}

impl RegisterSource for ModbusTcp {
    fn read_holding_registers(&mut self, address: u16, quantity: u16) -> Option<Vec<u8>> {
        match self.read_registers(address, quantity) {
            Ok(frame) => Some(frame),
            Err(e) => {
                log::warn!(
                    "Modbus read of {} registers at {} from {}:{} failed: {}",
                    quantity,
                    address,
                    self.address,
                    self.port,
                    e
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::exception::SentryException;
    use crate::telemetry::modbus::{
        check_response_header, check_response_pdu, deserialize, serialize, MbapHeader, ModbusTcp,
        ReadHoldingRegistersRequest,
    };
    use crate::telemetry::registers::register_block;
    use crate::config::TelemetryConfig;
    use crate::telemetry::{RegisterSource, TelemetryDecoder};
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::time::Duration;

    #[test]
    fn request_encoding() {
        let request = ReadHoldingRegistersRequest::new(0x0102, 0, 270, 6);
        assert_eq!(
            serialize(&request).unwrap(),
            vec![0x01, 0x02, 0, 0, 0, 6, 0, 0x03, 0x01, 0x0e, 0, 6]
        );
    }

    #[test]
    fn header_decoding() {
        let header: MbapHeader = deserialize(&[0, 7, 0, 0, 0, 15, 1]).unwrap();
        assert_eq!(
            header,
            MbapHeader {
                transaction_id: 7,
                protocol_id: 0,
                length: 15,
                unit_id: 1
            }
        );
        let request = ReadHoldingRegistersRequest::new(7, 1, 400, 6);
        assert_eq!(check_response_header(&header, &request).unwrap(), 14);
        let other = ReadHoldingRegistersRequest::new(8, 1, 400, 6);
        assert!(check_response_header(&header, &other).is_err());
    }

    #[test]
    fn pdu_checks() {
        let request = ReadHoldingRegistersRequest::new(1, 0, 280, 2);
        check_response_pdu(&[0x03, 4, 0, 1, 0, 2], &request).unwrap();
        assert!(check_response_pdu(&[0x03, 2, 0, 1], &request).is_err());
        assert!(check_response_pdu(&[0x04, 4, 0, 1, 0, 2], &request).is_err());
        match check_response_pdu(&[0x83, 0x02], &request) {
            Err(SentryException::ModbusException { message }) => {
                assert!(message.contains("IllegalDataAddress"))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    fn respond(socket: &mut std::net::TcpStream, registers: &[u16], exception: bool) {
        let mut request = [0_u8; 12];
        socket.read_exact(&mut request).unwrap();
        assert_eq!(request[7], 0x03);
        let mut response = vec![request[0], request[1], 0, 0];
        if exception {
            response.extend_from_slice(&[0, 3, request[6], 0x83, 0x02]);
        } else {
            let length = 3 + 2 * registers.len() as u16;
            response.extend_from_slice(&length.to_be_bytes());
            response.push(request[6]);
            response.push(0x03);
            response.push(2 * registers.len() as u8);
            for register in registers {
                response.extend_from_slice(&register.to_be_bytes());
            }
        }
        socket.write_all(&response).unwrap();
    }

    #[test]
    fn reads_registers_from_server() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = std::thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            respond(&mut socket, &[1, 2, 3, 4, 5, 65535], false);
            respond(&mut socket, &[], true);
        });
        let mut modbus = ModbusTcp::new("127.0.0.1", port, 0, Duration::from_secs(1)).unwrap();
        let frame = modbus.read_holding_registers(270, 6).unwrap();
        assert_eq!(register_block::<6>(&frame), Some([1, 2, 3, 4, 5, 65535]));
        assert_eq!(modbus.read_holding_registers(270, 6), None);
        server.join().unwrap();
    }

    #[test]
    fn silent_server_gives_none() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let mut modbus = ModbusTcp::new("127.0.0.1", port, 0, Duration::from_millis(50)).unwrap();
        let (_socket, _) = listener.accept().unwrap();
        assert_eq!(modbus.read_holding_registers(280, 6), None);
        assert!(!modbus.is_connected());
        assert!(modbus.read_registers(280, 0).is_err());
    }

    #[test]
    fn reconnects_after_connection_loss() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = std::thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            let mut request = [0_u8; 12];
            socket.read_exact(&mut request).unwrap();
            drop(socket);
            let (mut socket, _) = listener.accept().unwrap();
            for _ in 0..3 {
                respond(&mut socket, &[10, 20, 30, 40, 50, 60], false);
            }
        });
        let mut modbus = ModbusTcp::new("127.0.0.1", port, 0, Duration::from_secs(1)).unwrap();
        assert_eq!(modbus.read_holding_registers(280, 6), None);
        assert!(!modbus.is_connected());
        for _ in 0..3 {
            let frame = modbus.read_holding_registers(280, 6).unwrap();
            assert_eq!(register_block::<6>(&frame), Some([10, 20, 30, 40, 50, 60]));
        }
        assert_eq!(modbus.reconnects(), 1);
        server.join().unwrap();
    }

    #[test]
    fn decoder_recovers_after_connection_loss() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = std::thread::spawn(move || {
            let (socket, _) = listener.accept().unwrap();
            drop(socket);
            let (mut socket, _) = listener.accept().unwrap();
            respond(&mut socket, &[1000, 0, 0, 0, 0, 65535], false);
        });
        let modbus = ModbusTcp::new("127.0.0.1", port, 0, Duration::from_secs(1)).unwrap();
        let mut telemetry = TelemetryDecoder::new(modbus, &TelemetryConfig::default());
        let speeds = telemetry.read_joint_speeds();
        assert_eq!(speeds, [1., 0., 0., 0., 0., -0.]);
        assert_eq!(telemetry.exhausted_reads(), 0);
        server.join().unwrap();
    }
}
