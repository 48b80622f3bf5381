/// Playback tuning shared by the engine and output stages.
#[derive(Clone, Debug)]
pub struct PlaybackConfig {
    /// Working buffer duration per loop iteration, in milliseconds.
    pub buffer_ms: u64,
    /// Output device substring match; `None` selects the host default.
    pub device: Option<String>,
}

impl Default for PlaybackConfig {
    /// 96 ms keeps the loop responsive to controls while giving the device
    /// comfortable headroom.
    fn default() -> Self {
        Self {
            buffer_ms: 96,
            device: None,
        }
    }
}
