//! Built-in story premises offered on the scenario-selection screen.

use once_cell::sync::Lazy;
use rand::seq::SliceRandom;
use serde::Serialize;

use crate::error::FableError;
use crate::session::{AuthoringContext, Session};

#[derive(Debug, Clone, Serialize)]
pub struct Scenario {
    pub id: &'static str,
    pub title: &'static str,
    pub summary: &'static str,
    pub opening: &'static str,
    pub character_name: &'static str,
    pub character_class: &'static str,
    pub character_background: &'static str,
}

impl Scenario {
    pub fn context(&self) -> AuthoringContext {
        AuthoringContext {
            world_title: self.title.to_string(),
            world_summary: self.summary.to_string(),
            opening_scene: self.opening.to_string(),
            character_name: self.character_name.to_string(),
            character_class: self.character_class.to_string(),
            character_background: self.character_background.to_string(),
            ..Default::default()
        }
    }

    pub fn start(&self) -> Session {
        Session::from_context(self.context())
    }
}

static SCENARIOS: Lazy<Vec<Scenario>> = Lazy::new(|| {
    vec![
        Scenario {
            id: "lighthouse",
            title: "The Last Lighthouse",
            summary: "A storm-wracked coast where the lighthouse keeper has vanished.",
            opening: "Rain hammers the shutters as you climb the spiral stairs. The lamp above is dark.",
            character_name: "Wren",
            character_class: "Relief keeper",
            character_background: "Sent by the harbor board with a letter no one will read.",
        },
        Scenario {
            id: "caravan",
            title: "Salt Road Caravan",
            summary: "A trade caravan crossing a desert of glass and old machines.",
            opening: "The lead camel refuses to move. Ahead, the dunes glitter with broken mirrors.",
            character_name: "Idris",
            character_class: "Caravan scout",
            character_background: "Knows the road but owes money to everyone on it.",
        },
        Scenario {
            id: "station",
            title: "Orbital Station Nine",
            summary: "A research station whose crew stopped answering hails three days ago.",
            opening: "The docking clamps release with a shudder. The corridor lights flicker red.",
            character_name: "Vega",
            character_class: "Systems engineer",
            character_background: "Volunteered for the rescue run because her brother is aboard.",
        },
        Scenario {
            id: "manor",
            title: "Ashgrove Manor",
            summary: "A crumbling estate where a reading of the will is about to go wrong.",
            opening: "Candles gutter in the drawing room. Someone has locked the doors from outside.",
            character_name: "Edmund",
            character_class: "Disinherited nephew",
            character_background: "Came for the money, stayed because the doors will not open.",
        },
    ]
});

pub fn builtin_scenarios() -> &'static [Scenario] {
    &SCENARIOS
}

pub fn find_scenario(id: &str) -> Result<&'static Scenario, FableError> {
    let id = id.trim();
    SCENARIOS
        .iter()
        .find(|s| s.id.eq_ignore_ascii_case(id))
        .ok_or_else(|| FableError::UnknownScenario(id.to_string()))
}

pub fn random_scenario() -> &'static Scenario {
    let mut rng = rand::thread_rng();
    SCENARIOS.choose(&mut rng).unwrap_or(&SCENARIOS[0])
}
