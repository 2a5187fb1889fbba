use bevy::prelude::*;
use bitflags::bitflags;

bitflags! {
    /// Toggles for the periodic aether systems.
    #[derive(Resource, Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AetherCapabilities: u32 {
        const RECOVERY = 1 << 0;
        const DEAD_ZONES = 1 << 1;
        const CORRUPTION = 1 << 2;
        const PERSISTENCE = 1 << 3;
    }
}

impl Default for AetherCapabilities {
    fn default() -> Self {
        Self::all()
    }
}

/// Run condition that passes while every bit of `flag` is enabled.
pub fn capability_enabled(
    flag: AetherCapabilities,
) -> impl Fn(Res<AetherCapabilities>) -> bool + Clone {
    move |capabilities: Res<AetherCapabilities>| capabilities.contains(flag)
}
