//! Per-modem connection context.

use embedded_hal_async::delay::DelayNs;

use crate::{
    Error, Link,
    backend::{Backend, BootFrame, Capabilities, CrashLog, ExtOps, ModemType},
    map::{BootMap, Direction, Layout, MagicMap},
    notify::Notifier,
};

/// One attached modem: its link, its layout, the boot maps derived from it and the backend
/// driving it.
///
/// Created when the modem is probed and dropped when it detaches. Only one transfer may be in
/// flight per link; the `&mut self` receivers of the transfer operations enforce that.
pub struct LinkDevice<'n, L, D> {
    pub(crate) link: L,
    pub(crate) delay: D,
    pub(crate) layout: Layout,
    pub(crate) notifier: &'n Notifier,
    pub(crate) boot_map: BootMap,
    pub(crate) magic_map: MagicMap,
    pub(crate) dl_map: MagicMap,
    /// The modem announced an upload frame that has not been taken yet.
    pub(crate) upload_staged: bool,
    ext_op: Backend,
}

impl<'n, L: Link, D: DelayNs> LinkDevice<'n, L, D> {
    /// Resolve the backend for `modem` and lay out the boot maps.
    ///
    /// Fails with [`Error::Unsupported`] when no backend for `modem` is compiled in, and with
    /// [`Error::BadLayout`] when `layout` does not fit the window of `link`.
    pub fn new(
        modem: ModemType,
        link: L,
        delay: D,
        layout: Layout,
        notifier: &'n Notifier,
    ) -> Result<Self, Error> {
        let ext_op = Backend::for_modem(modem).ok_or(Error::Unsupported)?;
        layout.validate(link.size())?;

        let mut ld = Self {
            link,
            delay,
            layout,
            notifier,
            boot_map: BootMap::new(&layout, Direction::Download),
            magic_map: MagicMap::default(),
            dl_map: MagicMap::default(),
            upload_staged: false,
            ext_op,
        };

        ext_op.init_boot_map(&mut ld);
        if ext_op.capabilities().contains(Capabilities::INIT_DL_MAP) {
            ext_op.init_dl_map(&mut ld);
        }

        Ok(ld)
    }

    pub fn name(&self) -> &str {
        self.link.name()
    }

    pub fn ext_op(&self) -> Backend {
        self.ext_op
    }

    pub fn notifier(&self) -> &'n Notifier {
        self.notifier
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn boot_map(&self) -> &BootMap {
        &self.boot_map
    }

    /// Magic map of bridges that boot through a raw buffer, zeroed for all others.
    pub fn magic_map(&self) -> &MagicMap {
        &self.magic_map
    }

    pub fn dl_map(&self) -> &MagicMap {
        &self.dl_map
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Point the boot map at the fields of `direction`.
    pub fn set_direction(&mut self, direction: Direction) {
        self.boot_map = BootMap::new(&self.layout, direction);
    }

    /// Interpret a code raised by the modem. Safe to call from interrupt context through
    /// [`ExtOps::dload_cmd_handler`] with the same notifier.
    pub fn handle_command(&self, code: u16) {
        self.ext_op.dload_cmd_handler(self.notifier, code);
    }

    /// The modem signalled that it started; finish the boot handshake.
    pub fn cp_start(&mut self) {
        let ext_op = self.ext_op;
        ext_op.cp_start_handler(self);
    }

    /// The modem crashed; pull its last words out of the receive buffer.
    pub fn crash_log(&self) -> Option<CrashLog> {
        self.ext_op.crash_log(self)
    }

    pub async fn xmit_binary(&mut self, frame: BootFrame<'_>) -> Result<usize, Error> {
        let ext_op = self.ext_op;
        ext_op.xmit_binary(self, frame).await
    }

    pub fn setdl_magic(&mut self) -> Result<(), Error> {
        let ext_op = self.ext_op;
        ext_op.setdl_magic(self)
    }

    /// Control surface entry point: run the request `cmd` with the argument buffer `arg`.
    ///
    /// Returns the number of bytes written back into `arg`.
    pub async fn ioctl(&mut self, cmd: u32, arg: &mut [u8]) -> Result<usize, Error> {
        let ext_op = self.ext_op;
        ext_op.ioctl(self, cmd, arg).await
    }
}
