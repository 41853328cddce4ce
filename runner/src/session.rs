//! VM session abstraction.
//!
//! A [`VmSession`] is one instantiated virtual machine: it carries a single
//! device identity, runs one deployed program, and hands every frame it would
//! send to the installed packet hook. Sessions are produced by a [`VmFactory`]
//! and are never shared between tests.

use std::future::Future;

use anyhow::Result;

use crate::core::device_id::DeviceId;

/// Callback receiving every frame the session emits.
pub type PacketHook = Box<dyn FnMut(&[u8]) + Send + 'static>;

/// Transport a session may attach to for live traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    Tcp { host: String, port: u16 },
}

pub trait VmSession: Send {
    fn init(&mut self) -> Result<()>;

    fn set_device_id(&mut self, id: &DeviceId);

    fn start(&mut self);

    /// Deploy a program image. Non-zero means the VM rejected it.
    fn deploy(&mut self, binary: &[u8]) -> i32;

    /// Deploy through the client-side path (as a remote deployer would).
    fn client_deploy(&mut self, binary: &[u8]) -> i32;

    /// Install or clear (`None`) the packet hook, replacing any previous one.
    fn set_packet_hook(&mut self, hook: Option<PacketHook>);

    fn setup_transport(&mut self, transport: &Transport) -> Result<()>;
}

/// Produces fresh, initialized sessions.
pub trait VmFactory {
    type Session: VmSession;

    fn instantiate(&self) -> impl Future<Output = Result<Self::Session>>;

    /// Deploy `binary` into a scratch VM that is never started and return the
    /// VM's deploy code.
    fn check_deploy(&self, binary: &[u8]) -> Result<i32>;
}
