// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Shared memory transport.
//
// The server owns one well-known mailbox (segment + semaphore set at the
// configured key) that every client posts requests into. Each client owns a
// private mailbox and stamps its ids into every request; the server attaches
// that mailbox to post the response.

use std::os::fd::RawFd;

use crate::error::{self, ErrorCode, IpcError};
use crate::mailbox::Mailbox;
use crate::protocol::{Method, Request, Response, MAILBOX_SIZE, REQUEST_SIZE, RESPONSE_SIZE};
use crate::sem::{SemSet, MAILBOX_INIT};
use crate::shm::{ShmOpenMode, ShmSegment};

use super::{Op, Role, Transport, TransportContext};

/// A segment together with the semaphore set guarding it.
#[derive(Debug)]
struct Endpoint {
    shm: ShmSegment,
    sems: SemSet,
}

impl Endpoint {
    fn mailbox(&self) -> Mailbox<'_> {
        Mailbox::new(&self.shm, &self.sems)
    }
}

/// Semaphore failures other than EINTR/EIDRM leave the mailbox protocol in
/// an unknown state; they terminate the process.
fn escalate<T>(result: Result<T, IpcError>) -> Result<T, IpcError> {
    match result {
        Err(IpcError::Os {
            op,
            code: ErrorCode::SystemError,
            source,
        }) if op.starts_with("semop") => error::fatal(op, &source),
        other => other,
    }
}

#[derive(Debug, Default)]
pub struct ShmemTransport {
    /// Mailbox this side reads from: the well-known one on the server,
    /// the private one on a client.
    local: Option<Endpoint>,
    /// Client only: the server's well-known mailbox.
    server: Option<Endpoint>,
    /// Server only: `(resource_id, sem_id)` of the last requester.
    reply_to: Option<(i32, i32)>,
}

impl ShmemTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn init_server(&mut self, ctx: &mut TransportContext) -> Result<(), IpcError> {
        let sems = SemSet::create(ctx.key, &MAILBOX_INIT).map_err(|e| IpcError::os("semget", e))?;
        let shm = match ShmSegment::acquire(ctx.key, MAILBOX_SIZE, ShmOpenMode::CreateOrOpen) {
            Ok(shm) => shm,
            Err(e) => {
                let _ = sems.destroy();
                return Err(IpcError::os("shmget", e));
            }
        };
        ctx.resource_id = shm.id();
        ctx.sem_id = sems.id();
        tracing::info!(
            key = ctx.key,
            resource_id = ctx.resource_id,
            sem_id = ctx.sem_id,
            "shared memory mailbox ready"
        );
        self.local = Some(Endpoint { shm, sems });
        Ok(())
    }

    fn init_client(&mut self, ctx: &mut TransportContext) -> Result<(), IpcError> {
        let sems = SemSet::open(ctx.key).map_err(|e| IpcError::os("semget(server)", e))?;
        let shm = ShmSegment::acquire(ctx.key, MAILBOX_SIZE, ShmOpenMode::Open)
            .map_err(|e| IpcError::os("shmget(server)", e))?;
        self.server = Some(Endpoint { shm, sems });

        if self.local.is_none() {
            let sems = match SemSet::create_private(&MAILBOX_INIT) {
                Ok(sems) => sems,
                Err(e) => error::fatal("semget(private)", &e),
            };
            let shm = match ShmSegment::allocate_private(MAILBOX_SIZE, ctx.shm_lookup_threshold) {
                Ok(shm) => shm,
                Err(e) => {
                    let _ = sems.destroy();
                    error::fatal("shmget(private)", &e)
                }
            };
            self.local = Some(Endpoint { shm, sems });
        }
        if let Some(local) = &self.local {
            ctx.resource_id = local.shm.id();
            ctx.sem_id = local.sems.id();
        }
        tracing::debug!(
            resource_id = ctx.resource_id,
            sem_id = ctx.sem_id,
            "private reply mailbox ready"
        );
        Ok(())
    }
}

impl Transport for ShmemTransport {
    fn method(&self) -> Method {
        Method::Shmem
    }

    fn init(&mut self, ctx: &mut TransportContext) -> Result<(), IpcError> {
        match ctx.role {
            Role::Server => self.init_server(ctx),
            Role::Client => self.init_client(ctx),
        }
    }

    fn send_request(&mut self, ctx: &mut TransportContext) -> Result<(), IpcError> {
        Op::SendRequest.check_role(ctx.role)?;
        let (Some(server), Some(local)) = (&self.server, &self.local) else {
            return Err(ErrorCode::InvalidIpcPacket.into());
        };
        let req = ctx.request_mut()?;
        req.method = Method::Shmem;
        req.client_pid = std::process::id() as i32;
        req.resource_id = local.shm.id();
        req.sem_id = local.sems.id();
        let frame = req.encode();
        escalate(server.mailbox().post(&frame))
    }

    fn receive_request(&mut self, ctx: &mut TransportContext) -> Result<Option<RawFd>, IpcError> {
        Op::ReceiveRequest.check_role(ctx.role)?;
        let Some(local) = &self.local else {
            return Err(ErrorCode::InvalidIpcPacket.into());
        };
        let mut frame = [0u8; REQUEST_SIZE];
        escalate(local.mailbox().take(&mut frame))?;
        let req = Request::decode(&frame)?;
        self.reply_to = Some((req.resource_id, req.sem_id));
        tracing::debug!(
            pid = req.client_pid,
            resource_id = req.resource_id,
            sem_id = req.sem_id,
            command = %req.command,
            "request received"
        );
        ctx.set_request(req);
        Ok(None)
    }

    fn send_response(&mut self, ctx: &mut TransportContext) -> Result<(), IpcError> {
        Op::SendResponse.check_role(ctx.role)?;
        if self.local.is_none() {
            return Err(ErrorCode::InvalidIpcPacket.into());
        }
        let Some((resource_id, sem_id)) = self.reply_to else {
            return Err(ErrorCode::InvalidIpcPacket.into());
        };
        let frame = ctx.response()?.encode();
        // Attached for this one response; detached when `shm` drops.
        let shm = ShmSegment::attach(resource_id).map_err(|e| IpcError::os("shmat(client)", e))?;
        let sems = SemSet::from_id(sem_id);
        escalate(Mailbox::new(&shm, &sems).post(&frame))
    }

    fn receive_response(&mut self, ctx: &mut TransportContext) -> Result<(), IpcError> {
        Op::ReceiveResponse.check_role(ctx.role)?;
        let Some(local) = &self.local else {
            return Err(ErrorCode::InvalidIpcPacket.into());
        };
        let mut frame = [0u8; RESPONSE_SIZE];
        escalate(local.mailbox().take(&mut frame))?;
        ctx.set_response(Response::decode(&frame)?);
        Ok(())
    }

    fn finish(&mut self, ctx: &mut TransportContext) -> Result<(), IpcError> {
        let mut result = Ok(());
        // The server's mailbox is only detached by a client, never removed.
        self.server = None;
        if let Some(local) = self.local.take() {
            if let Err(e) = local.shm.remove() {
                result = Err(IpcError::os("shmctl(IPC_RMID)", e));
            }
            if let Err(e) = local.sems.destroy() {
                result = Err(IpcError::os("semctl(IPC_RMID)", e));
            }
        }
        self.reply_to = None;
        ctx.resource_id = -1;
        ctx.sem_id = -1;
        result
    }
}
