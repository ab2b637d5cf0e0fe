//
// Copyright (c) The PPP Engine Contributors
//
// SPDX-License-Identifier: MIT
//

use tracing::warn;

use crate::session::FdOrigin;

/// PPP engine errors.
#[derive(Debug)]
pub enum Error {
    // I/O errors
    IoError(IoError),
    // Session setup
    NoLayers,
    // Layer registration
    UnknownLayer(String),
    // Layer startup
    LayerStart(String, Box<Error>),
    // Operation on a released session
    SessionDown,
    // Failure reported by a layer implementation
    Layer(String),
}

/// PPP engine I/O errors.
#[derive(Debug)]
pub enum IoError {
    MuxOpen(std::io::Error),
    ChannelIndex(std::io::Error),
    ChannelAttach(std::io::Error),
    UnitCreate(std::io::Error),
    UnitConnect(std::io::Error),
    FrameRecv(FdOrigin, std::io::Error),
    FrameSend(FdOrigin, std::io::Error),
    ShortFrame(FdOrigin, usize),
    ShortSend(FdOrigin, usize, usize),
}

// ===== impl Error =====

impl Error {
    pub(crate) fn log(&self) {
        match self {
            Error::IoError(error) => {
                error.log();
            }
            Error::NoLayers | Error::SessionDown => {
                warn!("{}", self);
            }
            Error::UnknownLayer(name) => {
                warn!(%name, "{}", self);
            }
            Error::LayerStart(name, error) => {
                warn!(%name, error = %with_source(error.as_ref()), "{}", self);
            }
            Error::Layer(..) => {
                warn!("{}", self);
            }
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::IoError(error) => error.fmt(f),
            Error::NoLayers => {
                write!(f, "no layers to start")
            }
            Error::UnknownLayer(..) => {
                write!(f, "unknown layer")
            }
            Error::LayerStart(..) => {
                write!(f, "failed to start layer")
            }
            Error::SessionDown => {
                write!(f, "session is down")
            }
            Error::Layer(reason) => {
                write!(f, "{}", reason)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(error) => Some(error),
            Error::LayerStart(_, error) => Some(error),
            _ => None,
        }
    }
}

impl From<IoError> for Error {
    fn from(error: IoError) -> Error {
        Error::IoError(error)
    }
}

// ===== impl IoError =====

impl IoError {
    pub(crate) fn log(&self) {
        match self {
            IoError::MuxOpen(error)
            | IoError::ChannelIndex(error)
            | IoError::ChannelAttach(error)
            | IoError::UnitCreate(error)
            | IoError::UnitConnect(error) => {
                warn!(error = %with_source(error), "{}", self);
            }
            IoError::FrameRecv(origin, error)
            | IoError::FrameSend(origin, error) => {
                warn!(%origin, error = %with_source(error), "{}", self);
            }
            IoError::ShortFrame(origin, len) => {
                warn!(%origin, %len, "{}", self);
            }
            IoError::ShortSend(origin, len, expected) => {
                warn!(%origin, %len, %expected, "{}", self);
            }
        }
    }
}

impl std::fmt::Display for IoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IoError::MuxOpen(..) => {
                write!(f, "failed to open PPP multiplexor")
            }
            IoError::ChannelIndex(..) => {
                write!(f, "failed to get PPP channel index")
            }
            IoError::ChannelAttach(..) => {
                write!(f, "failed to attach PPP channel")
            }
            IoError::UnitCreate(..) => {
                write!(f, "failed to create PPP unit")
            }
            IoError::UnitConnect(..) => {
                write!(f, "failed to connect channel to unit")
            }
            IoError::FrameRecv(..) => {
                write!(f, "failed to read frame")
            }
            IoError::FrameSend(..) => {
                write!(f, "failed to send frame")
            }
            IoError::ShortFrame(..) => {
                write!(f, "short frame read")
            }
            IoError::ShortSend(..) => {
                write!(f, "short frame write")
            }
        }
    }
}

impl std::error::Error for IoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IoError::MuxOpen(error)
            | IoError::ChannelIndex(error)
            | IoError::ChannelAttach(error)
            | IoError::UnitCreate(error)
            | IoError::UnitConnect(error)
            | IoError::FrameRecv(_, error)
            | IoError::FrameSend(_, error) => Some(error),
            _ => None,
        }
    }
}

// ===== global functions =====

fn with_source<E: std::error::Error>(error: E) -> String {
    if let Some(source) = error.source() {
        format!("{} ({})", error, with_source(source))
    } else {
        error.to_string()
    }
}
