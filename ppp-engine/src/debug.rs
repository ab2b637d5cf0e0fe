//
// Copyright (c) The PPP Engine Contributors
//
// SPDX-License-Identifier: MIT
//

use tracing::{debug, debug_span};

use crate::session::{FdOrigin, SessionState};

/// PPP engine debug messages.
#[derive(Debug)]
pub enum Debug<'a> {
    SessionEstablish(&'a str, &'a str, &'a str),
    SessionDestablish(&'a str),
    SessionDelete(&'a str),
    StateTransition(&'a str, SessionState, SessionState),
    FrameRx(FdOrigin, u16, usize),
    FrameTx(FdOrigin, usize),
    ProtoReject(u16),
    LayerStart(&'a str, &'a str),
    LayerFinish(&'a str, &'a str),
    UnitCacheTake(i32),
    UnitCachePut(i32),
}

// ===== impl Debug =====

impl Debug<'_> {
    // Log debug message using the tracing API.
    pub(crate) fn log(&self) {
        match self {
            Debug::SessionEstablish(ifname, ctrl, chan) => {
                debug_span!("session", %ifname).in_scope(|| {
                    debug!(%ctrl, %chan, "{}", self);
                });
            }
            Debug::SessionDestablish(ifname) | Debug::SessionDelete(ifname) => {
                debug_span!("session", %ifname).in_scope(|| {
                    debug!("{}", self);
                });
            }
            Debug::StateTransition(ifname, old_state, new_state) => {
                debug_span!("session", %ifname).in_scope(|| {
                    debug!(?old_state, ?new_state, "{}", self);
                });
            }
            Debug::FrameRx(origin, proto, len) => {
                debug!(%origin, proto = %format!("{:#06x}", proto), %len, "{}", self);
            }
            Debug::FrameTx(origin, len) => {
                debug!(%origin, %len, "{}", self);
            }
            Debug::ProtoReject(proto) => {
                debug!(proto = %format!("{:#06x}", proto), "{}", self);
            }
            Debug::LayerStart(ifname, layer) | Debug::LayerFinish(ifname, layer) => {
                debug_span!("session", %ifname).in_scope(|| {
                    debug!(%layer, "{}", self);
                });
            }
            Debug::UnitCacheTake(unit_idx) | Debug::UnitCachePut(unit_idx) => {
                debug!(%unit_idx, "{}", self);
            }
        }
    }
}

impl std::fmt::Display for Debug<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Debug::SessionEstablish(..) => {
                write!(f, "channel connected to unit")
            }
            Debug::SessionDestablish(..) => {
                write!(f, "session released")
            }
            Debug::SessionDelete(..) => {
                write!(f, "session deleted")
            }
            Debug::StateTransition(..) => {
                write!(f, "state transition")
            }
            Debug::FrameRx(..) => {
                write!(f, "frame received")
            }
            Debug::FrameTx(..) => {
                write!(f, "frame sent")
            }
            Debug::ProtoReject(..) => {
                write!(f, "unclaimed protocol, sending Protocol-Reject")
            }
            Debug::LayerStart(..) => {
                write!(f, "starting layer")
            }
            Debug::LayerFinish(..) => {
                write!(f, "finishing layer")
            }
            Debug::UnitCacheTake(..) => {
                write!(f, "reusing pooled PPP unit")
            }
            Debug::UnitCachePut(..) => {
                write!(f, "pooled released PPP unit")
            }
        }
    }
}
