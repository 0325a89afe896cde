//! Control session for one controller

use strand_hal::Transport;

use crate::bootloader::BootloaderClient;
use crate::config::DeviceProfile;
use crate::firmware::FirmwareClient;
use crate::link::DeviceLink;

/// Owns the link to one controller and lends out protocol clients
///
/// Clients borrow the session mutably, so at most one of them exists at a
/// time and requests never interleave.
pub struct Control<T> {
    link: DeviceLink<T>,
    profile: DeviceProfile,
}

impl<T: Transport> Control<T> {
    /// Open a session over `transport` for a device described by `profile`
    pub fn new(transport: T, profile: DeviceProfile) -> Self {
        let link = DeviceLink::new(transport, profile.response_timeout());
        Self { link, profile }
    }

    /// Client for the bootloader protocol
    pub fn bootloader(&mut self) -> BootloaderClient<'_, T> {
        BootloaderClient::new(&mut self.link, &self.profile)
    }

    /// Client for the running LED firmware
    pub fn firmware(&mut self) -> FirmwareClient<'_, T> {
        FirmwareClient::new(&mut self.link, &self.profile)
    }

    /// Device profile of this session
    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    /// Underlying link
    pub fn link(&mut self) -> &mut DeviceLink<T> {
        &mut self.link
    }

    /// Close the session and release the transport
    pub fn into_transport(self) -> T {
        self.link.into_inner()
    }
}
