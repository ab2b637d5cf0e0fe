//
// Copyright (c) The PPP Engine Contributors
//
// SPDX-License-Identifier: MIT
//

use ppp_utils::{UnboundedReceiver, UnboundedSender};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::session::{SessionId, TerminateCause};

// Useful type definitions.
pub type IbusReceiver = UnboundedReceiver<IbusMsg>;
pub type IbusSender = UnboundedSender<IbusMsg>;

/// Ibus messages exchanged between the PPP engine and the other components.
#[derive(Clone, Debug)]
#[derive(Deserialize, Serialize)]
pub enum IbusMsg {
    /// Configuration reload notification carrying the new `ppp` section.
    ConfigReload(Config),
    /// A session attached its kernel unit and started negotiation.
    SessionStarting { id: SessionId, ifname: String },
    /// A session completed every layer tier.
    SessionActive { id: SessionId, ifname: String },
    /// A session is about to release its descriptors.
    SessionPreFinished { id: SessionId },
    /// A session released all of its resources.
    SessionFinished {
        id: SessionId,
        cause: Option<TerminateCause>,
    },
}
