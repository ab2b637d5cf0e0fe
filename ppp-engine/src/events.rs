//
// Copyright (c) The PPP Engine Contributors
//
// SPDX-License-Identifier: MIT
//

use std::io;
use std::mem;

use crate::debug::Debug;
use crate::error::IoError;
use crate::session::{FdOrigin, Session, TerminateCause};

// ===== global functions =====

/// Demultiplexes inbound frames on the channel descriptor until it would
/// block.
///
/// A zero-length read means the transport hung up and hard-terminates the
/// session.
pub fn chan_read(session: &mut Session) {
    read_loop(session, FdOrigin::Chan);
}

/// Demultiplexes inbound frames on the unit descriptor until it would
/// block. Zero-length unit reads are benign.
pub fn unit_read(session: &mut Session) {
    read_loop(session, FdOrigin::Unit);
}

// ===== helper functions =====

fn read_loop(session: &mut Session, origin: FdOrigin) {
    // The session buffer is reused for every frame; handlers only ever see
    // it as a borrowed slice for the duration of their call.
    let mut buf = mem::take(&mut session.buf);

    loop {
        // A handler may have torn the session down; in that case the
        // descriptor slot is empty and the loop must not read again.
        let Some(fd) = session.fd(origin) else {
            break;
        };

        let n = match fd.recv(&mut buf) {
            Ok(n) => n,
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => break,
            Err(error) => {
                IoError::FrameRecv(origin, error).log();
                break;
            }
        };
        if n == 0 {
            match origin {
                // The transport hung up.
                FdOrigin::Chan => {
                    session.terminate(TerminateCause::NasError, true);
                }
                FdOrigin::Unit => (),
            }
            break;
        }
        if n < 2 {
            IoError::ShortFrame(origin, n).log();
            continue;
        }

        let proto = u16::from_be_bytes([buf[0], buf[1]]);
        dispatch(session, origin, proto, &buf[..n]);
    }

    if !session.is_down() {
        session.buf = buf;
    }
}

// Hands a frame to the first handler claiming its protocol number, or
// answers with an LCP Protocol-Reject when none does.
fn dispatch(session: &mut Session, origin: FdOrigin, proto: u16, frame: &[u8]) {
    if session.verbose() {
        Debug::FrameRx(origin, proto, frame.len()).log();
    }

    let Some(idx) = session
        .handler_list(origin)
        .iter()
        .position(|slot| slot.proto == proto)
    else {
        Debug::ProtoReject(proto).log();
        session.send_proto_rej(proto);
        return;
    };

    let id = session.handler_list(origin)[idx].id;
    let Some(mut handler) = session.handler_list_mut(origin)[idx].handler.take()
    else {
        return;
    };
    handler.recv(session, frame);
    session.put_handler(origin, id, handler);
}
