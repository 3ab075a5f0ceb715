// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains exception and Result definitions
use thiserror::Error;

/// Represents all kind of errors which can occur while talking to the robot or setting up the
/// sentry.
///
/// Note that a failed register read is not an error: the telemetry decoder retries it and falls
/// back to a zero reading, see [`TelemetryDecoder`](`crate::TelemetryDecoder`).
#[derive(Error, Debug)]
pub enum SentryException {
    /// NetworkException is returned if a connection to the robot cannot be established, or when a
    /// timeout occurs.
    #[error("{message:?}")]
    NetworkException { message: String },

    /// ModbusException is returned if the Modbus server answers with an exception response or with
    /// a frame which does not match the request.
    #[error("{message:?}")]
    ModbusException { message: String },

    /// CommandException is returned if a motion command could not be sent to the robot.
    #[error("{message:?}")]
    CommandException { message: String },

    /// ConfigException is returned if a configuration file cannot be read or contains invalid
    /// values.
    #[error("{message:?}")]
    ConfigException { message: String },
}

/// creates a ConfigException from anything printable
pub(crate) fn create_config_exception<T: ToString>(message: T) -> SentryException {
    SentryException::ConfigException {
        message: message.to_string(),
    }
}

/// creates a NetworkException from anything printable
pub(crate) fn create_network_exception<T: ToString>(message: T) -> SentryException {
    SentryException::NetworkException {
        message: message.to_string(),
    }
}

/// Result type which can have SentryException as Error
pub type SentryResult<T> = Result<T, SentryException>;
