use super::records::StateFlags;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerState {
    /// Created but never started, or exited
    Stopped,
    Running,
    Restarting,
    Paused,
    Dead,
    OomKilled,
    /// Removed through this handle. Terminal.
    Removed,
}

impl ContainerState {
    /// Derives the state from raw inspect flags.
    ///
    /// The engine can report several flags at once; the first set flag in
    /// Dead, OOMKilled, Paused, Restarting, Running order wins.
    pub fn from_flags(flags: &StateFlags) -> Self {
        let checks = [
            (flags.dead, Self::Dead),
            (flags.oom_killed, Self::OomKilled),
            (flags.paused, Self::Paused),
            (flags.restarting, Self::Restarting),
            (flags.running, Self::Running),
        ];

        checks
            .into_iter()
            .find_map(|(set, state)| set.then_some(state))
            .unwrap_or(Self::Stopped)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Stopped => "stopped",
            Self::Running => "running",
            Self::Restarting => "restarting",
            Self::Paused => "paused",
            Self::Dead => "dead",
            Self::OomKilled => "oomkilled",
            Self::Removed => "removed",
        };
        f.write_str(label)
    }
}
