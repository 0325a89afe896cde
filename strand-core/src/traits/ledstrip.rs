//! LED strip actuation trait

use strand_protocol::{SetColor, SetFade};

/// Trait for LED strip drivers
///
/// Implementations translate script commands into pixel updates. Both
/// calls must return promptly; a fade is started here and advanced by the
/// driver's own refresh cycle.
pub trait LedStrip {
    /// Set the addressed LEDs to a color
    fn set_color(&mut self, cmd: &SetColor);

    /// Start fading the addressed LEDs to a color
    fn set_fade(&mut self, cmd: &SetFade);
}

impl<T: LedStrip + ?Sized> LedStrip for &mut T {
    fn set_color(&mut self, cmd: &SetColor) {
        (**self).set_color(cmd)
    }

    fn set_fade(&mut self, cmd: &SetFade) {
        (**self).set_fade(cmd)
    }
}
