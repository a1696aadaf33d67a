//! Close codes
//!
//! Callers close a session with a small [`CloseReason`]; the transport needs
//! a numeric close code. Servers may close with any [`ServerCloseCode`],
//! including the 4000-range protocol codes.

use std::fmt;

/// Generic reason a caller gives for closing the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseReason {
    /// Clean shutdown
    Ok,
    /// The client hit an error it cannot recover from
    ClientError,
    /// No particular reason
    Unspecified,
}

/// Close codes a client may close with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ClientCloseCode {
    Normal = 1000,
    GoingAway = 1001,
    NoStatus = 1005,
    Abnormal = 1006,
}

impl ClientCloseCode {
    /// Convert to u16
    pub fn as_u16(&self) -> u16 {
        *self as u16
    }

    /// Convert from u16
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1000 => Some(Self::Normal),
            1001 => Some(Self::GoingAway),
            1005 => Some(Self::NoStatus),
            1006 => Some(Self::Abnormal),
            _ => None,
        }
    }

    /// Codes that may be reported locally but never written to a close frame
    pub fn is_reserved(&self) -> bool {
        matches!(self, Self::NoStatus | Self::Abnormal)
    }
}

impl From<CloseReason> for ClientCloseCode {
    fn from(reason: CloseReason) -> Self {
        match reason {
            CloseReason::Ok => ClientCloseCode::Normal,
            CloseReason::ClientError => ClientCloseCode::Abnormal,
            CloseReason::Unspecified => ClientCloseCode::NoStatus,
        }
    }
}

impl fmt::Display for ClientCloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?})", self.as_u16(), self)
    }
}

/// Close codes the coordinating server may close with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ServerCloseCode {
    Normal = 1000,
    NoStatus = 1005,
    Abnormal = 1006,
    ServerError = 1011,
    ServiceRestart = 1012,
    BadGateway = 1014,
    UnknownError = 4000,
    InvalidOpcode = 4001,
    DecodeError = 4002,
    NotAuthenticated = 4003,
    AuthenticationFailed = 4004,
    AlreadyAuthenticated = 4005,
    HeartbeatTimeout = 4006,
    Ratelimited = 4008,
    InvalidCluster = 4010,
    InvalidClusterCount = 4011,
    InvalidCccId = 4012,
}

impl ServerCloseCode {
    /// Convert to u16
    pub fn as_u16(&self) -> u16 {
        *self as u16
    }

    /// Convert from u16
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1000 => Some(Self::Normal),
            1005 => Some(Self::NoStatus),
            1006 => Some(Self::Abnormal),
            1011 => Some(Self::ServerError),
            1012 => Some(Self::ServiceRestart),
            1014 => Some(Self::BadGateway),
            4000 => Some(Self::UnknownError),
            4001 => Some(Self::InvalidOpcode),
            4002 => Some(Self::DecodeError),
            4003 => Some(Self::NotAuthenticated),
            4004 => Some(Self::AuthenticationFailed),
            4005 => Some(Self::AlreadyAuthenticated),
            4006 => Some(Self::HeartbeatTimeout),
            4008 => Some(Self::Ratelimited),
            4010 => Some(Self::InvalidCluster),
            4011 => Some(Self::InvalidClusterCount),
            4012 => Some(Self::InvalidCccId),
            _ => None,
        }
    }

    /// Human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::Normal => "normal closure",
            Self::NoStatus => "no status",
            Self::Abnormal => "abnormal closure",
            Self::ServerError => "server error",
            Self::ServiceRestart => "service restart",
            Self::BadGateway => "bad gateway",
            Self::UnknownError => "unknown error",
            Self::InvalidOpcode => "invalid op code",
            Self::DecodeError => "decode error",
            Self::NotAuthenticated => "not authenticated",
            Self::AuthenticationFailed => "authentication failed",
            Self::AlreadyAuthenticated => "already authenticated",
            Self::HeartbeatTimeout => "heartbeat timeout",
            Self::Ratelimited => "rate limited",
            Self::InvalidCluster => "invalid cluster",
            Self::InvalidClusterCount => "invalid cluster count",
            Self::InvalidCccId => "invalid CCC id",
        }
    }
}

/// Describe a numeric close code received from the server
pub fn describe_close_code(code: u16) -> &'static str {
    ServerCloseCode::from_u16(code)
        .map(|c| c.description())
        .unwrap_or("unrecognized close code")
}
