//
// Copyright (c) The PPP Engine Contributors
//
// SPDX-License-Identifier: MIT
//

#![allow(dead_code)]

use std::any::Any;
use std::collections::HashMap;
use std::os::fd::OwnedFd;
use std::sync::{Arc, Mutex};

use ppp_engine::Shared;
use ppp_engine::config::Config;
use ppp_engine::error::Error;
use ppp_engine::ibus::IbusMsg;
use ppp_engine::layer::{Layer, LayerData, LayerId, LayerRegistry};
use ppp_engine::session::{
    FrameHandler, ProtoRej, Session, SessionId, TerminateCause,
};
use tokio::sync::mpsc;
use tokio::sync::mpsc::UnboundedReceiver;

/// How a stub layer behaves when started.
#[derive(Clone, Copy, Debug)]
pub enum StartMode {
    /// Stay in the starting state until driven externally.
    Wait,
    /// Complete negotiation synchronously.
    Started,
    /// Consent to remain passive synchronously.
    Passive,
    /// Fail to start.
    Fail,
}

/// Shared record of every stub layer invocation.
#[derive(Debug, Default)]
pub struct LayerLog {
    events: Mutex<Vec<String>>,
    ids: Mutex<HashMap<String, LayerId>>,
}

impl LayerLog {
    pub fn new() -> Arc<LayerLog> {
        Arc::new(Default::default())
    }

    pub fn push(&self, layer: &str, event: &str) {
        self.events.lock().unwrap().push(format!("{} {}", layer, event));
    }

    pub fn record_id(&self, layer: &str, id: LayerId) {
        self.ids.lock().unwrap().insert(layer.to_owned(), id);
    }

    /// Returns the pipeline id a layer was started with.
    pub fn id(&self, layer: &str) -> LayerId {
        self.ids.lock().unwrap()[layer]
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

/// Scriptable layer recording its entry-point invocations.
pub struct StubLayer {
    pub name: &'static str,
    pub mode: StartMode,
    pub optional: bool,
    // Whether `finish` reports completion synchronously.
    pub finish_completes: bool,
    pub log: Arc<LayerLog>,
}

pub struct StubData {
    pub name: &'static str,
    pub optional: bool,
}

impl StubLayer {
    pub fn new(
        name: &'static str,
        mode: StartMode,
        log: &Arc<LayerLog>,
    ) -> Arc<StubLayer> {
        Arc::new(StubLayer {
            name,
            mode,
            optional: false,
            finish_completes: true,
            log: log.clone(),
        })
    }

    pub fn new_optional(
        name: &'static str,
        mode: StartMode,
        log: &Arc<LayerLog>,
    ) -> Arc<StubLayer> {
        Arc::new(StubLayer {
            name,
            mode,
            optional: true,
            finish_completes: true,
            log: log.clone(),
        })
    }

    pub fn new_pending_finish(
        name: &'static str,
        mode: StartMode,
        log: &Arc<LayerLog>,
    ) -> Arc<StubLayer> {
        Arc::new(StubLayer {
            name,
            mode,
            optional: false,
            finish_completes: false,
            log: log.clone(),
        })
    }
}

impl Layer for StubLayer {
    fn init(&self, _session: &mut Session) -> Box<dyn LayerData> {
        self.log.push(self.name, "init");
        Box::new(StubData {
            name: self.name,
            optional: self.optional,
        })
    }

    fn start(
        &self,
        session: &mut Session,
        id: LayerId,
        _data: &mut dyn LayerData,
    ) -> Result<(), Error> {
        self.log.push(self.name, "start");
        self.log.record_id(self.name, id);
        match self.mode {
            StartMode::Wait => Ok(()),
            StartMode::Started => {
                session.layer_started(id);
                Ok(())
            }
            StartMode::Passive => {
                session.layer_passive(id);
                Ok(())
            }
            StartMode::Fail => {
                Err(Error::Layer(format!("{} refused to start", self.name)))
            }
        }
    }

    fn finish(
        &self,
        session: &mut Session,
        id: LayerId,
        _data: &mut dyn LayerData,
    ) {
        self.log.push(self.name, "finish");
        if self.finish_completes {
            session.layer_finished(id);
        }
    }
}

impl LayerData for StubData {
    fn optional(&self) -> bool {
        self.optional
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Shared record of handler invocations.
#[derive(Debug, Default)]
pub struct HandlerLog {
    pub frames: Mutex<Vec<Vec<u8>>>,
    pub proto_rejs: Mutex<usize>,
}

impl HandlerLog {
    pub fn new() -> Arc<HandlerLog> {
        Arc::new(Default::default())
    }

    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.frames.lock().unwrap().clone()
    }

    pub fn proto_rejs(&self) -> usize {
        *self.proto_rejs.lock().unwrap()
    }
}

/// Frame handler recording every received frame.
pub struct RecHandler {
    pub log: Arc<HandlerLog>,
}

impl FrameHandler for RecHandler {
    fn recv(&mut self, _session: &mut Session, frame: &[u8]) {
        self.log.frames.lock().unwrap().push(frame.to_vec());
    }

    fn recv_proto_rej(&mut self, _session: &mut Session) {
        *self.log.proto_rejs.lock().unwrap() += 1;
    }
}

/// Frame handler hard-terminating the session from inside `recv`.
pub struct TermHandler {
    pub log: Arc<HandlerLog>,
}

impl FrameHandler for TermHandler {
    fn recv(&mut self, session: &mut Session, frame: &[u8]) {
        self.log.frames.lock().unwrap().push(frame.to_vec());
        session.terminate(TerminateCause::UserRequest, true);
    }
}

/// Recording Protocol-Reject helper.
#[derive(Debug, Default)]
pub struct RejLog {
    protos: Mutex<Vec<u16>>,
}

impl RejLog {
    pub fn new() -> Arc<RejLog> {
        Arc::new(Default::default())
    }

    pub fn protos(&self) -> Vec<u16> {
        self.protos.lock().unwrap().clone()
    }
}

pub struct RecProtoRej {
    pub log: Arc<RejLog>,
}

impl ProtoRej for RecProtoRej {
    fn send_proto_rej(&mut self, _session: &mut Session, proto: u16) {
        self.log.protos.lock().unwrap().push(proto);
    }
}

// ===== helper functions =====

pub fn as_layer(layer: &Arc<StubLayer>) -> Arc<dyn Layer> {
    layer.clone()
}

pub fn config(unit_cache: usize) -> Config {
    Config {
        unit_cache,
        ..Default::default()
    }
}

pub fn shared(config: Config, layers: Vec<(&str, Arc<dyn Layer>)>) -> Shared {
    let mut registry = LayerRegistry::new();
    for (name, layer) in layers {
        registry.register(name, layer).unwrap();
    }
    Shared::new(config, registry)
}

pub fn transport_fd() -> OwnedFd {
    std::fs::File::open("/dev/null").unwrap().into()
}

pub fn new_session(
    id: SessionId,
    shared: &Shared,
) -> (Session, UnboundedReceiver<IbusMsg>) {
    let (ibus_tx, ibus_rx) = mpsc::unbounded_channel();
    let session = Session::new(
        id,
        transport_fd(),
        "test".to_owned(),
        "chan0".to_owned(),
        shared.clone(),
        ibus_tx,
    );
    (session, ibus_rx)
}

/// Drains the lifecycle events observed so far into short tags.
pub fn drain_events(ibus_rx: &mut UnboundedReceiver<IbusMsg>) -> Vec<&'static str> {
    let mut events = Vec::new();
    while let Ok(msg) = ibus_rx.try_recv() {
        events.push(match msg {
            IbusMsg::ConfigReload(..) => "config-reload",
            IbusMsg::SessionStarting { .. } => "starting",
            IbusMsg::SessionActive { .. } => "active",
            IbusMsg::SessionPreFinished { .. } => "pre-finished",
            IbusMsg::SessionFinished { .. } => "finished",
        });
    }
    events
}
