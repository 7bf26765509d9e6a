//! Read-only view of the object an effect is attached to.

use indexmap::IndexMap;

/// Handle to a named numeric member, resolved once at bind time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemberId(pub usize);

/// Per-tick scalars exposed by the host object.
pub trait Host {
    /// Current throttle setting in `[0, 1]`.
    fn throttle(&self) -> f32;

    /// Whether the engine is operational (running and producing thrust).
    fn engine_on(&self) -> bool;

    /// Whether the engine is ignited. Drives ignition/flameout events.
    fn ignited(&self) -> bool;

    /// Normalised thrust per thruster.
    fn thrust_fractions(&self) -> &[f32];

    /// Velocity magnitude.
    fn speed(&self) -> f32;

    fn atmosphere_density(&self) -> f32;

    /// Resolves a named numeric member through the host's accessor table.
    fn member_id(&self, name: &str) -> Option<MemberId>;

    /// Reads a member previously resolved with [`Host::member_id`].
    fn member(&self, id: MemberId) -> f32;
}

/// Plain-data host. Useful for tests, scripted scenarios and hosts that copy
/// their state into a snapshot once per frame.
#[derive(Debug, Clone, Default)]
pub struct HostState {
    pub throttle: f32,
    pub engine_on: bool,
    pub ignited: bool,
    pub thrust_fractions: Vec<f32>,
    pub speed: f32,
    pub atmosphere_density: f32,
    members: IndexMap<String, f32>,
}

impl HostState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Host with `count` thrusters, all at rest.
    pub fn with_thrusters(count: usize) -> Self {
        Self {
            thrust_fractions: vec![0.0; count],
            ..Self::default()
        }
    }

    /// Registers (or updates) a named member readable by adapter controllers.
    pub fn set_member(&mut self, name: impl Into<String>, value: f32) {
        self.members.insert(name.into(), value);
    }

    /// Sets throttle and thrust together, the way a running engine reports them.
    pub fn run_engine(&mut self, throttle: f32) {
        self.engine_on = true;
        self.ignited = true;
        self.throttle = throttle;
        for fraction in &mut self.thrust_fractions {
            *fraction = throttle;
        }
    }

    pub fn shutdown(&mut self) {
        self.engine_on = false;
        self.ignited = false;
        self.throttle = 0.0;
        self.thrust_fractions.iter_mut().for_each(|fraction| *fraction = 0.0);
    }
}

impl Host for HostState {
    fn throttle(&self) -> f32 {
        self.throttle
    }

    fn engine_on(&self) -> bool {
        self.engine_on
    }

    fn ignited(&self) -> bool {
        self.ignited
    }

    fn thrust_fractions(&self) -> &[f32] {
        &self.thrust_fractions
    }

    fn speed(&self) -> f32 {
        self.speed
    }

    fn atmosphere_density(&self) -> f32 {
        self.atmosphere_density
    }

    fn member_id(&self, name: &str) -> Option<MemberId> {
        self.members.get_index_of(name).map(MemberId)
    }

    fn member(&self, id: MemberId) -> f32 {
        self.members
            .get_index(id.0)
            .map(|(_, value)| *value)
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn members_resolve_to_stable_ids() {
        let mut host = HostState::new();
        host.set_member("chamber_temp", 900.0);
        host.set_member("gimbal", 0.2);

        let id = host.member_id("gimbal").expect("member registered");
        host.set_member("gimbal", 0.7);

        assert_eq!(host.member(id), 0.7);
        assert!(host.member_id("missing").is_none());
    }

    #[test]
    fn run_engine_updates_thrusters() {
        let mut host = HostState::with_thrusters(3);
        host.run_engine(0.6);
        assert!(host.engine_on && host.ignited);
        assert_eq!(host.thrust_fractions(), &[0.6, 0.6, 0.6]);

        host.shutdown();
        assert_eq!(host.thrust_fractions(), &[0.0, 0.0, 0.0]);
    }
}
