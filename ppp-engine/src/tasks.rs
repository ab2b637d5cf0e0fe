//
// Copyright (c) The PPP Engine Contributors
//
// SPDX-License-Identifier: MIT
//

use std::future::poll_fn;
use std::sync::Arc;
use std::task::{Context, Poll};

use ppp_utils::Receiver;
use ppp_utils::task::Task;
use tracing::Instrument;
use tracing::debug_span;

use crate::events;
use crate::ibus::{IbusMsg, IbusReceiver};
use crate::session::{Session, TerminateCause};
use crate::tasks::messages::input::SessionMsg;
use crate::Shared;

//
// PPP session task diagram:
//
//                        +--------------+
//      controller        |              | -> ibus lifecycle events
//   terminate (1x) ----> |   session    |
//   chan readiness ----> |     task     |
//   unit readiness ----> |              |
//                        +--------------+
//
// All callbacks of one session (frame demultiplexing, layer completion,
// terminate requests) run serially on its task; different sessions run in
// parallel.
//

// PPP inter-task message types.
pub mod messages {
    // Input messages (controller -> session task).
    pub mod input {
        use derive_new::new;
        use serde::{Deserialize, Serialize};

        use crate::session::TerminateCause;

        #[derive(Debug)]
        #[derive(Deserialize, Serialize)]
        pub enum SessionMsg {
            Terminate(TerminateMsg),
        }

        #[derive(Debug, new)]
        #[derive(Deserialize, Serialize)]
        pub struct TerminateMsg {
            pub cause: TerminateCause,
            pub hard: bool,
        }
    }
}

// What woke the session task up.
enum Input {
    Msg(SessionMsg),
    CtrlClosed,
    ChanReadable,
    UnitReadable,
}

// ===== PPP tasks =====

/// Spawns the task driving `session`.
pub fn session_task(
    session: Session,
    msg_rx: Receiver<SessionMsg>,
) -> Task<()> {
    #[cfg(not(feature = "testing"))]
    {
        let span = debug_span!("session", id = session.id);
        Task::spawn(run(session, msg_rx).instrument(span))
    }
    #[cfg(feature = "testing")]
    {
        Task::spawn(async move { std::future::pending().await })
    }
}

/// Spawns the engine-level ibus listener handling configuration reloads.
pub fn ibus_listener(shared: Shared, ibus_rx: IbusReceiver) -> Task<()> {
    #[cfg(not(feature = "testing"))]
    {
        let mut ibus_rx = ibus_rx;
        Task::spawn(async move {
            while let Some(msg) = ibus_rx.recv().await {
                match msg {
                    IbusMsg::ConfigReload(config) => {
                        shared.config.store(Arc::new(config));
                    }
                    // Ignore other events.
                    _ => {}
                }
            }
        })
    }
    #[cfg(feature = "testing")]
    {
        Task::spawn(async move { std::future::pending().await })
    }
}

// ===== helper functions =====

async fn run(mut session: Session, mut msg_rx: Receiver<SessionMsg>) {
    if let Err(error) = session.establish() {
        error.log();
        return;
    }

    while !session.is_down() {
        let input =
            poll_fn(|cx| poll_input(&mut session, &mut msg_rx, cx)).await;
        match input {
            Input::Msg(SessionMsg::Terminate(msg)) => {
                session.terminate(msg.cause, msg.hard);
            }
            // The controller went away; take the session down with it.
            Input::CtrlClosed => {
                session.terminate(TerminateCause::AdminReset, true);
            }
            Input::ChanReadable => events::chan_read(&mut session),
            Input::UnitReadable => events::unit_read(&mut session),
        }
    }
}

// Polls the three input sources of a session task: control messages and
// read readiness on the two kernel descriptors.
fn poll_input(
    session: &mut Session,
    msg_rx: &mut Receiver<SessionMsg>,
    cx: &mut Context<'_>,
) -> Poll<Input> {
    match msg_rx.poll_recv(cx) {
        Poll::Ready(Some(msg)) => return Poll::Ready(Input::Msg(msg)),
        Poll::Ready(None) => return Poll::Ready(Input::CtrlClosed),
        Poll::Pending => (),
    }
    if let Some(fd) = session.chan_fd()
        && fd.poll_recv_ready(cx).is_ready()
    {
        return Poll::Ready(Input::ChanReadable);
    }
    if let Some(fd) = session.unit_fd()
        && fd.poll_recv_ready(cx).is_ready()
    {
        return Poll::Ready(Input::UnitReadable);
    }

    Poll::Pending
}
