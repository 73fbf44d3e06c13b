//! A headless smell world
//!
//! Three scented entities sit at fixed positions; one mobile agent carries a
//! smell sensor per channel and a straight/right/left effector. Each tick the
//! daemon reads the sensor frame into the network and applies the network's
//! motor drive back to the agent.

use synfire::prelude::Prng;

use crate::config::WorldConfig;

pub const SMELL_CHANNELS: usize = 3;

const AGENT_START: Agent = Agent {
    x: 120.0,
    y: 245.0,
    heading: 90.0,
};

#[derive(Debug, Clone)]
pub struct Entity {
    pub label: &'static str,
    pub x: f64,
    pub y: f64,
    pub profile: [f64; SMELL_CHANNELS],
    pub dispersion: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct Agent {
    pub x: f64,
    pub y: f64,
    /// Degrees, counterclockwise. 90 points toward smaller y (screen up).
    pub heading: f64,
}

pub struct OdorWorld {
    width: f64,
    height: f64,
    straight_increment: f64,
    turn_increment: f64,
    entities: Vec<Entity>,
    agent: Agent,
}

impl OdorWorld {
    /// Builds the classic layout: cheese below the agent's start, flower and
    /// fish further out, each scented on its own channel.
    pub fn new(config: &WorldConfig) -> Self {
        let entities = vec![
            Entity {
                label: "Cheese",
                x: 120.0,
                y: 180.0,
                profile: [1.0, 0.0, 0.0],
                dispersion: config.dispersion,
            },
            Entity {
                label: "Flower",
                x: 200.0,
                y: 100.0,
                profile: [0.0, 1.0, 0.0],
                dispersion: config.dispersion,
            },
            Entity {
                label: "Fish",
                x: 50.0,
                y: 100.0,
                profile: [0.0, 0.0, 1.0],
                dispersion: config.dispersion,
            },
        ];
        Self {
            width: config.width,
            height: config.height,
            straight_increment: config.straight_increment,
            turn_increment: config.turn_increment,
            entities,
            agent: AGENT_START,
        }
    }

    pub fn agent(&self) -> Agent {
        self.agent
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn place_agent(&mut self, x: f64, y: f64, heading: f64) {
        self.agent = Agent { x, y, heading };
    }

    /// One smell value per channel. Each entity contributes its profile
    /// scaled by `1 - d/dispersion`, floored at zero.
    pub fn sensor_frame(&self) -> Vec<f64> {
        let mut frame = vec![0.0; SMELL_CHANNELS];
        for entity in &self.entities {
            let dx = self.agent.x - entity.x;
            let dy = self.agent.y - entity.y;
            let distance = (dx * dx + dy * dy).sqrt();
            let scale = (1.0 - distance / entity.dispersion).max(0.0);
            if scale > 0.0 {
                for (channel, value) in frame.iter_mut().enumerate() {
                    *value += entity.profile[channel] * scale;
                }
            }
        }
        frame
    }

    /// Applies one tick of effector drive: turn first, then move along the
    /// new heading. Positions wrap at the world bounds.
    pub fn apply_drive(&mut self, straight: f64, right: f64, left: f64) {
        self.agent.heading =
            (self.agent.heading + (left - right) * self.turn_increment).rem_euclid(360.0);
        let radians = self.agent.heading.to_radians();
        let step = straight * self.straight_increment;
        self.agent.x = (self.agent.x + step * radians.cos()).rem_euclid(self.width);
        self.agent.y = (self.agent.y - step * radians.sin()).rem_euclid(self.height);
    }
}

/// Seeded wander policy for auto mode: keep moving, with occasional
/// multi-tick turn pulses.
pub struct WanderPilot {
    prng: Prng,
    turn: f64,
    remaining: u32,
}

impl WanderPilot {
    pub fn new(seed: u64) -> Self {
        Self {
            prng: Prng::new(seed),
            turn: 0.0,
            remaining: 0,
        }
    }

    /// Drive for the next tick as `(straight, right, left)`.
    pub fn next_drive(&mut self) -> (f64, f64, f64) {
        if self.remaining == 0 {
            // Mostly straight runs; roughly one tick in eight starts a turn.
            if self.prng.next_f64_01() < 0.125 {
                self.turn = self.prng.gen_range_f64(0.5, 1.5);
                if self.prng.next_f64_01() < 0.5 {
                    self.turn = -self.turn;
                }
                self.remaining = self.prng.gen_range_usize(5, 25) as u32;
            }
        } else {
            self.remaining -= 1;
        }
        let turn = if self.remaining > 0 { self.turn } else { 0.0 };
        if turn >= 0.0 {
            (1.0, 0.0, turn)
        } else {
            (1.0, -turn, 0.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn smell_is_full_on_the_entity_and_zero_at_dispersion() {
        let mut world = OdorWorld::new(&WorldConfig::default());

        world.place_agent(120.0, 180.0, 90.0);
        let frame = world.sensor_frame();
        assert!(close(frame[0], 1.0), "standing on the cheese: {:?}", frame);
        assert!(close(frame[1], 0.0));
        assert!(close(frame[2], 0.0));

        // Exactly one dispersion radius away the scent has decayed to zero.
        world.place_agent(120.0, 110.0, 90.0);
        let frame = world.sensor_frame();
        assert!(close(frame[0], 0.0), "at the edge: {:?}", frame);

        // Halfway out it reads half strength.
        world.place_agent(120.0, 145.0, 90.0);
        let frame = world.sensor_frame();
        assert!(close(frame[0], 0.5), "halfway: {:?}", frame);
    }

    #[test]
    fn heading_90_moves_toward_smaller_y() {
        let mut world = OdorWorld::new(&WorldConfig::default());
        world.place_agent(150.0, 150.0, 90.0);
        world.apply_drive(1.0, 0.0, 0.0);
        let agent = world.agent();
        assert!(close(agent.x, 150.0), "x drifted: {}", agent.x);
        assert!(close(agent.y, 148.0), "expected a 2.0 step up: {}", agent.y);
    }

    #[test]
    fn left_and_right_drives_turn_the_heading() {
        let mut world = OdorWorld::new(&WorldConfig::default());
        world.place_agent(150.0, 150.0, 90.0);
        world.apply_drive(0.0, 0.0, 1.0);
        assert!(close(world.agent().heading, 92.0));
        world.apply_drive(0.0, 1.0, 0.0);
        assert!(close(world.agent().heading, 90.0));
        world.apply_drive(0.0, 1.5, 0.0);
        assert!(close(world.agent().heading, 87.0));
    }

    #[test]
    fn positions_wrap_at_the_bounds() {
        let mut world = OdorWorld::new(&WorldConfig::default());
        world.place_agent(1.0, 150.0, 180.0);
        world.apply_drive(1.0, 0.0, 0.0);
        assert!(close(world.agent().x, 299.0), "x: {}", world.agent().x);

        world.place_agent(150.0, 1.0, 90.0);
        world.apply_drive(1.0, 0.0, 0.0);
        assert!(close(world.agent().y, 299.0), "y: {}", world.agent().y);
    }

    #[test]
    fn wander_is_deterministic_for_a_seed() {
        let mut a = WanderPilot::new(9);
        let mut b = WanderPilot::new(9);
        for _ in 0..200 {
            assert_eq!(a.next_drive(), b.next_drive());
        }
    }

    #[test]
    fn wander_always_keeps_moving() {
        let mut pilot = WanderPilot::new(3);
        for _ in 0..500 {
            let (straight, right, left) = pilot.next_drive();
            assert_eq!(straight, 1.0);
            assert!(right >= 0.0 && left >= 0.0);
            assert!(right == 0.0 || left == 0.0, "one turn direction at a time");
        }
    }
}
