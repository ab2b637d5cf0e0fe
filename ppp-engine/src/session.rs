//
// Copyright (c) The PPP Engine Contributors
//
// SPDX-License-Identifier: MIT
//

use std::os::fd::{AsFd, OwnedFd};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ppp_utils::pppdev::{self, PPP_MRU, PppFd};
use serde::{Deserialize, Serialize};

use crate::Shared;
use crate::debug::Debug;
use crate::error::{Error, IoError};
use crate::ibus::{IbusMsg, IbusSender};
use crate::layer::{Layer, LayerData, LayerId, LayerPipeline, same_layer};

pub type SessionId = usize;

/// Which of the session's two descriptors a frame crossed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FdOrigin {
    Chan,
    Unit,
}

/// PPP session states.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum SessionState {
    Idle,
    Starting,
    Active,
    Finishing,
    Finished,
}

/// Session termination causes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum TerminateCause {
    UserRequest,
    SessionTimeout,
    AdminReset,
    NasError,
    NasRequest,
    AuthError,
    LostCarrier,
    IdleTimeout,
}

/// Externally visible session record.
#[derive(Debug)]
pub struct SessionInfo {
    pub state: SessionState,
    pub ifname: String,
    pub unit_idx: i32,
    pub chan_idx: i32,
    /// Name of the transport that owns the session ("pppoe", "l2tp", ...).
    pub ctrl_name: String,
    /// Name of the transport channel (interface, tunnel id, ...).
    pub chan_name: String,
    pub terminate_cause: Option<TerminateCause>,
    pub create_time: DateTime<Utc>,
}

/// Inbound frame handler for a single protocol number.
///
/// Handlers are registered on the channel or the unit descriptor of one
/// session and are invoked serially from that session's task.
pub trait FrameHandler: Send {
    /// Consumes one inbound frame. `frame` starts with the 16-bit protocol
    /// tag in network byte order and is only valid for the duration of the
    /// call.
    fn recv(&mut self, session: &mut Session, frame: &[u8]);

    /// The peer rejected this handler's protocol.
    fn recv_proto_rej(&mut self, _session: &mut Session) {}
}

/// Emits LCP Protocol-Reject frames for protocol numbers no handler claims.
/// Installed on the session by the LCP layer.
pub trait ProtoRej: Send {
    fn send_proto_rej(&mut self, session: &mut Session, proto: u16);
}

/// Handle to a registered frame handler.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct HandlerId(u64);

pub(crate) struct HandlerSlot {
    pub(crate) id: HandlerId,
    pub(crate) proto: u16,
    // Taken out of the slot while the handler runs.
    pub(crate) handler: Option<Box<dyn FrameHandler>>,
}

/// One PPP session, multiplexed between a transport channel and a kernel
/// PPP unit.
///
/// The session owns both kernel descriptors from `establish` until
/// teardown, when the unit descriptor is either pooled or closed. All
/// methods must be called from the session's own task context.
pub struct Session {
    pub id: SessionId,
    pub info: SessionInfo,
    // Transport-provided descriptor carrying the connected channel.
    transport: Option<OwnedFd>,
    chan: Option<PppFd>,
    unit: Option<PppFd>,
    // Frame buffer, reused across reads.
    pub(crate) buf: Vec<u8>,
    chan_handlers: Vec<HandlerSlot>,
    unit_handlers: Vec<HandlerSlot>,
    next_handler_id: u64,
    pub(crate) pipeline: Option<LayerPipeline>,
    proto_rej: Option<Box<dyn ProtoRej>>,
    pub(crate) shared: Shared,
    ibus_tx: IbusSender,
}

// ===== impl FdOrigin =====

impl std::fmt::Display for FdOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FdOrigin::Chan => write!(f, "channel"),
            FdOrigin::Unit => write!(f, "unit"),
        }
    }
}

// ===== impl Session =====

impl Session {
    /// Creates a new session around a connected transport descriptor.
    pub fn new(
        id: SessionId,
        transport: OwnedFd,
        ctrl_name: String,
        chan_name: String,
        shared: Shared,
        ibus_tx: IbusSender,
    ) -> Session {
        Session {
            id,
            info: SessionInfo {
                state: SessionState::Idle,
                ifname: String::new(),
                unit_idx: -1,
                chan_idx: -1,
                ctrl_name,
                chan_name,
                terminate_cause: None,
                create_time: Utc::now(),
            },
            transport: Some(transport),
            chan: None,
            unit: None,
            buf: Vec::new(),
            chan_handlers: Vec::new(),
            unit_handlers: Vec::new(),
            next_handler_id: 0,
            pipeline: None,
            proto_rej: None,
            shared,
            ibus_tx,
        }
    }

    /// Attaches the session to the kernel PPP subsystem and starts the
    /// first layer tier.
    ///
    /// On error every descriptor acquired so far is closed and no lifecycle
    /// event is emitted.
    pub fn establish(&mut self) -> Result<(), Error> {
        let transport = self.transport.as_ref().ok_or(Error::SessionDown)?;
        let chan_idx = pppdev::channel_index(transport.as_fd())
            .map_err(IoError::ChannelIndex)?;

        let chan = PppFd::open_mux().map_err(IoError::MuxOpen)?;
        chan.attach_channel(chan_idx).map_err(IoError::ChannelAttach)?;

        // Adopt a pooled unit when one is available, skipping the unit
        // allocation ioctl.
        let bound = self.shared.config.load().unit_cache;
        let (unit, unit_idx) = match self.shared.unit_cache.try_take(bound) {
            Some((fd, unit_idx)) => (fd, unit_idx),
            None => {
                let fd = PppFd::open_mux().map_err(IoError::MuxOpen)?;
                let unit_idx = fd.new_unit().map_err(IoError::UnitCreate)?;
                (fd, unit_idx)
            }
        };
        chan.connect_unit(unit_idx).map_err(IoError::UnitConnect)?;

        let pipeline = LayerPipeline::new(&self.shared.layers);
        if pipeline.is_empty() {
            return Err(Error::NoLayers);
        }

        self.info.chan_idx = chan_idx;
        self.info.unit_idx = unit_idx;
        self.info.ifname = format!("ppp{}", unit_idx);
        self.pipeline = Some(pipeline);
        self.chan = Some(chan);
        self.unit = Some(unit);
        self.init_layers();
        self.buf = vec![0; PPP_MRU];

        Debug::SessionEstablish(
            &self.info.ifname,
            &self.info.ctrl_name,
            &self.info.chan_name,
        )
        .log();

        self.session_starting();
        self.start_tier(0);

        Ok(())
    }

    /// Terminates the session.
    ///
    /// A hard termination releases the session immediately; a soft one asks
    /// every live layer to finish first and tears down once the last of them
    /// reports back. Idempotent once the descriptors are gone.
    pub fn terminate(&mut self, cause: TerminateCause, hard: bool) {
        if self.chan.is_none() && self.unit.is_none() {
            return;
        }
        if self.info.terminate_cause.is_none() {
            self.info.terminate_cause = Some(cause);
        }

        if hard {
            self.destablish();
            return;
        }

        self.set_state(SessionState::Finishing);

        let mut finishing = false;
        for id in self.layer_ids() {
            let starting = self
                .pipeline
                .as_ref()
                .and_then(|pipeline| pipeline.entry(id))
                .is_some_and(|entry| entry.starting);
            if starting {
                finishing = true;
                self.call_layer_finish(id);
            }
        }
        if !finishing {
            self.destablish();
        }
    }

    // Releases the kernel descriptors, the layer pipeline and the frame
    // buffer, then announces the end of the session.
    fn destablish(&mut self) {
        self.event(IbusMsg::SessionPreFinished { id: self.id });

        // Return the unit to the pool or close it.
        if let Some(unit) = self.unit.take() {
            let bound = self.shared.config.load().unit_cache;
            self.shared.unit_cache.try_put(unit, self.info.unit_idx, bound);
        }
        self.chan.take();
        self.transport.take();

        // Drops every remaining layer data.
        self.pipeline.take();
        self.buf = Vec::new();

        Debug::SessionDestablish(&self.info.ifname).log();

        self.set_state(SessionState::Finished);
        self.event(IbusMsg::SessionFinished {
            id: self.id,
            cause: self.info.terminate_cause,
        });
    }

    /// Sends a control frame on the channel descriptor.
    ///
    /// Best effort: short writes are logged and reported as-is, with no
    /// retry loop or queueing. Control frames are expected to fit the
    /// kernel socket buffer.
    pub fn chan_send(&self, data: &[u8]) -> Result<usize, Error> {
        self.send(FdOrigin::Chan, data)
    }

    /// Sends a frame on the unit descriptor. Same contract as `chan_send`.
    pub fn unit_send(&self, data: &[u8]) -> Result<usize, Error> {
        self.send(FdOrigin::Unit, data)
    }

    fn send(&self, origin: FdOrigin, data: &[u8]) -> Result<usize, Error> {
        let fd = self.fd(origin).ok_or(Error::SessionDown)?;
        match fd.send(data) {
            Ok(n) => {
                if n < data.len() {
                    IoError::ShortSend(origin, n, data.len()).log();
                } else if self.verbose() {
                    Debug::FrameTx(origin, n).log();
                }
                Ok(n)
            }
            Err(error) => {
                let error = IoError::FrameSend(origin, error);
                error.log();
                Err(error.into())
            }
        }
    }

    /// Registers a handler for inbound channel frames carrying `proto`.
    ///
    /// A protocol number should be claimed at most once per list; when it
    /// isn't, only the first registration receives frames.
    pub fn register_chan_handler(
        &mut self,
        proto: u16,
        handler: Box<dyn FrameHandler>,
    ) -> HandlerId {
        self.register_handler(FdOrigin::Chan, proto, handler)
    }

    /// Registers a handler for inbound unit frames carrying `proto`.
    pub fn register_unit_handler(
        &mut self,
        proto: u16,
        handler: Box<dyn FrameHandler>,
    ) -> HandlerId {
        self.register_handler(FdOrigin::Unit, proto, handler)
    }

    fn register_handler(
        &mut self,
        origin: FdOrigin,
        proto: u16,
        handler: Box<dyn FrameHandler>,
    ) -> HandlerId {
        self.next_handler_id += 1;
        let id = HandlerId(self.next_handler_id);
        self.handler_list_mut(origin).push(HandlerSlot {
            id,
            proto,
            handler: Some(handler),
        });
        id
    }

    /// Removes a handler from whichever list holds it.
    pub fn unregister_handler(&mut self, id: HandlerId) {
        self.chan_handlers.retain(|slot| slot.id != id);
        self.unit_handlers.retain(|slot| slot.id != id);
    }

    /// Installs the Protocol-Reject helper invoked for unclaimed protocol
    /// numbers.
    pub fn set_proto_rej(&mut self, proto_rej: Box<dyn ProtoRej>) {
        self.proto_rej = Some(proto_rej);
    }

    /// Delivers a peer Protocol-Reject for `proto` to the matching handler,
    /// searching the channel list first. Unknown protocol numbers are
    /// ignored.
    pub fn recv_proto_rej(&mut self, proto: u16) {
        for origin in [FdOrigin::Chan, FdOrigin::Unit] {
            let Some(idx) = self
                .handler_list(origin)
                .iter()
                .position(|slot| slot.proto == proto)
            else {
                continue;
            };
            let id = self.handler_list(origin)[idx].id;
            if let Some(mut handler) =
                self.handler_list_mut(origin)[idx].handler.take()
            {
                handler.recv_proto_rej(self);
                self.put_handler(origin, id, handler);
            }
            return;
        }
    }

    /// Reports that a layer completed negotiation. Idempotent: repeated
    /// calls for an already started layer are no-ops.
    pub fn layer_started(&mut self, id: LayerId) {
        let Some(entry) =
            self.pipeline.as_mut().and_then(|pipeline| pipeline.entry_mut(id))
        else {
            return;
        };
        if entry.started {
            return;
        }
        entry.started = true;

        self.layer_started_check(id);
    }

    /// Reports that a layer consents to the session advancing without its
    /// own successful negotiation.
    pub fn layer_passive(&mut self, id: LayerId) {
        let Some(entry) =
            self.pipeline.as_mut().and_then(|pipeline| pipeline.entry_mut(id))
        else {
            return;
        };
        if entry.started {
            return;
        }
        entry.passive = true;

        self.layer_started_check(id);
    }

    /// Reports that a layer finished. Once no layer remains in the starting
    /// state, the session is released.
    pub fn layer_finished(&mut self, id: LayerId) {
        let Some(entry) =
            self.pipeline.as_mut().and_then(|pipeline| pipeline.entry_mut(id))
        else {
            return;
        };
        entry.finished = true;
        entry.starting = false;

        let Some(pipeline) = self.pipeline.as_ref() else {
            return;
        };
        for tier in &pipeline.tiers {
            for entry in &tier.items {
                if entry.starting && !entry.finished {
                    return;
                }
            }
        }

        self.destablish();
    }

    /// Returns the per-session data of the given registered layer.
    pub fn find_layer_data(
        &mut self,
        layer: &Arc<dyn Layer>,
    ) -> Option<&mut dyn LayerData> {
        let pipeline = self.pipeline.as_mut()?;
        pipeline
            .tiers
            .iter_mut()
            .flat_map(|tier| tier.items.iter_mut())
            .find(|entry| same_layer(&entry.layer, layer))
            .and_then(|entry| entry.data.as_deref_mut())
    }

    /// Returns the session state.
    pub fn state(&self) -> SessionState {
        self.info.state
    }

    /// Returns whether the session released its descriptors.
    pub fn is_down(&self) -> bool {
        self.chan.is_none() && self.unit.is_none()
    }

    /// Returns the channel descriptor, if the session is up.
    pub fn chan_fd(&self) -> Option<&PppFd> {
        self.chan.as_ref()
    }

    /// Returns the unit descriptor, if the session is up.
    pub fn unit_fd(&self) -> Option<&PppFd> {
        self.unit.as_ref()
    }

    pub(crate) fn fd(&self, origin: FdOrigin) -> Option<&PppFd> {
        match origin {
            FdOrigin::Chan => self.chan.as_ref(),
            FdOrigin::Unit => self.unit.as_ref(),
        }
    }

    pub(crate) fn verbose(&self) -> bool {
        self.shared.config.load().verbose
    }

    pub(crate) fn handler_list(&self, origin: FdOrigin) -> &Vec<HandlerSlot> {
        match origin {
            FdOrigin::Chan => &self.chan_handlers,
            FdOrigin::Unit => &self.unit_handlers,
        }
    }

    pub(crate) fn handler_list_mut(
        &mut self,
        origin: FdOrigin,
    ) -> &mut Vec<HandlerSlot> {
        match origin {
            FdOrigin::Chan => &mut self.chan_handlers,
            FdOrigin::Unit => &mut self.unit_handlers,
        }
    }

    // Returns a taken-out handler to its slot. The slot may have been
    // unregistered while the handler ran, in which case the handler is
    // dropped here.
    pub(crate) fn put_handler(
        &mut self,
        origin: FdOrigin,
        id: HandlerId,
        handler: Box<dyn FrameHandler>,
    ) {
        if let Some(slot) = self
            .handler_list_mut(origin)
            .iter_mut()
            .find(|slot| slot.id == id)
            && slot.handler.is_none()
        {
            slot.handler = Some(handler);
        }
    }

    // Answers an unclaimed protocol number with an LCP Protocol-Reject via
    // the installed helper.
    pub(crate) fn send_proto_rej(&mut self, proto: u16) {
        let Some(mut proto_rej) = self.proto_rej.take() else {
            return;
        };
        proto_rej.send_proto_rej(self, proto);
        if self.proto_rej.is_none() {
            self.proto_rej = Some(proto_rej);
        }
    }

    // Instantiates the per-layer data of the freshly built pipeline.
    fn init_layers(&mut self) {
        for id in self.layer_ids() {
            let Some(layer) = self
                .pipeline
                .as_ref()
                .and_then(|pipeline| pipeline.entry(id))
                .map(|entry| entry.layer.clone())
            else {
                continue;
            };
            let data = layer.init(self);
            if let Some(entry) =
                self.pipeline.as_mut().and_then(|pipeline| pipeline.entry_mut(id))
            {
                entry.optional = data.optional();
                entry.data = Some(data);
            }
        }
    }

    // Marks every layer of the tier as starting and invokes its start entry
    // point, in registration order. A start error soft-terminates the
    // session.
    fn start_tier(&mut self, tier: usize) {
        let count = self
            .pipeline
            .as_ref()
            .map_or(0, |pipeline| pipeline.tier_len(tier));
        for item in 0..count {
            let id = LayerId { tier, item };
            let Some(entry) = self
                .pipeline
                .as_mut()
                .and_then(|pipeline| pipeline.entry_mut(id))
            else {
                return;
            };
            entry.starting = true;
            if let Err(error) = self.call_layer_start(id) {
                Error::LayerStart(self.layer_name(id), Box::new(error)).log();
                self.terminate(TerminateCause::NasError, false);
                return;
            }
        }
    }

    // Advances the pipeline once the tier of the given layer completed:
    // every layer started or passive, and at least one non-optional layer
    // started. Completing the last tier activates the session.
    fn layer_started_check(&mut self, id: LayerId) {
        let last_tier;
        {
            let Some(pipeline) = self.pipeline.as_ref() else {
                return;
            };
            let Some(tier) = pipeline.tiers.get(id.tier) else {
                return;
            };
            let mut any_started = false;
            for entry in &tier.items {
                if !entry.started && !entry.passive {
                    return;
                }
                if entry.started && !entry.optional {
                    any_started = true;
                }
            }
            if !any_started {
                return;
            }
            last_tier = id.tier + 1 == pipeline.tiers.len();
        }

        if last_tier {
            if self.info.state == SessionState::Starting {
                self.session_activate();
            }
        } else {
            self.start_tier(id.tier + 1);
        }
    }

    // Invokes a layer's start entry point with its data taken out of the
    // pipeline, guarding against the layer tearing the session down before
    // returning.
    fn call_layer_start(&mut self, id: LayerId) -> Result<(), Error> {
        let Some((layer, mut data)) = self.take_layer(id) else {
            return Ok(());
        };
        Debug::LayerStart(&self.info.ifname, &self.layer_name(id)).log();
        let result = layer.start(self, id, data.as_mut());
        self.put_layer(id, data);
        result
    }

    fn call_layer_finish(&mut self, id: LayerId) {
        let Some((layer, mut data)) = self.take_layer(id) else {
            return;
        };
        Debug::LayerFinish(&self.info.ifname, &self.layer_name(id)).log();
        layer.finish(self, id, data.as_mut());
        self.put_layer(id, data);
    }

    fn take_layer(
        &mut self,
        id: LayerId,
    ) -> Option<(Arc<dyn Layer>, Box<dyn LayerData>)> {
        let entry = self.pipeline.as_mut()?.entry_mut(id)?;
        let data = entry.data.take()?;
        Some((entry.layer.clone(), data))
    }

    fn put_layer(&mut self, id: LayerId, data: Box<dyn LayerData>) {
        if let Some(entry) =
            self.pipeline.as_mut().and_then(|pipeline| pipeline.entry_mut(id))
            && entry.data.is_none()
        {
            entry.data = Some(data);
        }
        // Otherwise the pipeline was released while the layer ran and the
        // data is dropped here.
    }

    fn layer_ids(&self) -> Vec<LayerId> {
        self.pipeline
            .as_ref()
            .map(|pipeline| pipeline.ids().collect())
            .unwrap_or_default()
    }

    fn layer_name(&self, id: LayerId) -> String {
        self.pipeline
            .as_ref()
            .and_then(|pipeline| pipeline.entry(id))
            .map(|entry| entry.name.clone())
            .unwrap_or_default()
    }

    fn session_starting(&mut self) {
        self.set_state(SessionState::Starting);
        self.event(IbusMsg::SessionStarting {
            id: self.id,
            ifname: self.info.ifname.clone(),
        });
    }

    fn session_activate(&mut self) {
        self.set_state(SessionState::Active);
        self.event(IbusMsg::SessionActive {
            id: self.id,
            ifname: self.info.ifname.clone(),
        });
    }

    fn set_state(&mut self, state: SessionState) {
        Debug::StateTransition(&self.info.ifname, self.info.state, state)
            .log();
        self.info.state = state;
    }

    fn event(&self, msg: IbusMsg) {
        let _ = self.ibus_tx.send(msg);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        Debug::SessionDelete(&self.info.ifname).log();
    }
}
