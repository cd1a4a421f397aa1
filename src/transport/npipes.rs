// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Named pipe transport. Not implemented; every operation reports `Unimplemented`.

use std::os::fd::RawFd;

use crate::error::{ErrorCode, IpcError};
use crate::protocol::Method;

use super::{Transport, TransportContext};

#[derive(Debug, Default)]
pub struct NamedPipeTransport;

impl Transport for NamedPipeTransport {
    fn method(&self) -> Method {
        Method::NamedPipes
    }

    fn init(&mut self, _ctx: &mut TransportContext) -> Result<(), IpcError> {
        Err(ErrorCode::Unimplemented.into())
    }

    fn send_request(&mut self, _ctx: &mut TransportContext) -> Result<(), IpcError> {
        Err(ErrorCode::Unimplemented.into())
    }

    fn receive_request(&mut self, _ctx: &mut TransportContext) -> Result<Option<RawFd>, IpcError> {
        Err(ErrorCode::Unimplemented.into())
    }

    fn send_response(&mut self, _ctx: &mut TransportContext) -> Result<(), IpcError> {
        Err(ErrorCode::Unimplemented.into())
    }

    fn receive_response(&mut self, _ctx: &mut TransportContext) -> Result<(), IpcError> {
        Err(ErrorCode::Unimplemented.into())
    }

    fn finish(&mut self, _ctx: &mut TransportContext) -> Result<(), IpcError> {
        Err(ErrorCode::Unimplemented.into())
    }
}
