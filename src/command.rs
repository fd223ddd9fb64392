use crate::config::ConfigUpdate;

#[derive(Debug)]
pub enum Command {
    /// Adjust the gate aggressiveness in realtime (0.0 - 1.0)
    SetNoiseReduction(f32),
    /// Stage a partial configuration, applied at the next frame boundary
    Configure(ConfigUpdate),
    /// Clear all adaptive state (noise profile, overlap tails, gain)
    Reset,
    /// Route input to output untouched
    SetBypass(bool),
}
