//! Cue catalogue: which audio cues exist, how they are grouped into sets, and
//! which one to play when the engine opens a cue window.

use anyhow::{anyhow, Result};
use rand::{seq::SliceRandom, Rng};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AudioCue {
    pub id: String,
    pub name: String,
    pub file_path: String,
    pub enabled: bool,
    /// Tone pitch used when the cue is synthesized instead of read from `file_path`.
    #[serde(default = "default_tone_hz")]
    pub tone_hz: f32,
}

fn default_tone_hz() -> f32 {
    440.0
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CueSet {
    pub id: String,
    pub name: String,
    pub cue_ids: Vec<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CueLibrary {
    pub cues: Vec<AudioCue>,
    pub sets: Vec<CueSet>,
}

impl CueLibrary {
    /// A single active set with one synthesized chime, so a fresh install can run a session.
    pub fn starter() -> Self {
        let mut library = Self::default();
        let chime = library.add_cue("Chime", "", 523.25);
        library.create_set("Default", vec![chime.id]);
        if let Some(set) = library.sets.last_mut() {
            set.is_active = true;
        }
        library
    }

    pub fn add_cue(&mut self, name: &str, file_path: &str, tone_hz: f32) -> AudioCue {
        let cue = AudioCue {
            id: format!("cue_{}", Uuid::new_v4().simple()),
            name: name.to_string(),
            file_path: file_path.to_string(),
            enabled: true,
            tone_hz,
        };
        self.cues.push(cue.clone());
        cue
    }

    pub fn toggle_cue(&mut self, cue_id: &str) -> Result<bool> {
        let cue = self
            .cues
            .iter_mut()
            .find(|cue| cue.id == cue_id)
            .ok_or_else(|| anyhow!("cue {cue_id} not found"))?;
        cue.enabled = !cue.enabled;
        Ok(cue.enabled)
    }

    /// Removes the cue and every reference to it from the sets.
    pub fn remove_cue(&mut self, cue_id: &str) {
        self.cues.retain(|cue| cue.id != cue_id);
        for set in &mut self.sets {
            set.cue_ids.retain(|id| id != cue_id);
        }
    }

    pub fn create_set(&mut self, name: &str, cue_ids: Vec<String>) -> String {
        let id = format!("set_{}", Uuid::new_v4().simple());
        self.sets.push(CueSet {
            id: id.clone(),
            name: name.to_string(),
            cue_ids,
            is_active: false,
        });
        id
    }

    /// Makes `set_id` the only active set.
    pub fn activate_set(&mut self, set_id: &str) -> Result<()> {
        if !self.sets.iter().any(|set| set.id == set_id) {
            return Err(anyhow!("cue set {set_id} not found"));
        }
        for set in &mut self.sets {
            set.is_active = set.id == set_id;
        }
        Ok(())
    }

    pub fn active_set(&self) -> Option<&CueSet> {
        self.sets.iter().find(|set| set.is_active)
    }

    pub fn enabled_cues_in_active_set(&self) -> Vec<&AudioCue> {
        let Some(active) = self.active_set() else {
            return Vec::new();
        };
        self.cues
            .iter()
            .filter(|cue| cue.enabled && active.cue_ids.contains(&cue.id))
            .collect()
    }

    /// Uniformly picks one enabled cue from the active set.
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&AudioCue> {
        self.enabled_cues_in_active_set().choose(rng).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn only_enabled_cues_of_the_active_set_are_picked() {
        let mut library = CueLibrary::default();
        let a = library.add_cue("A", "a.wav", 440.0);
        let b = library.add_cue("B", "b.wav", 550.0);
        let c = library.add_cue("C", "c.wav", 660.0);
        let set = library.create_set("night", vec![a.id.clone(), b.id.clone()]);
        library.create_set("other", vec![c.id.clone()]);

        let mut rng = StdRng::seed_from_u64(7);
        assert!(library.pick(&mut rng).is_none());

        library.activate_set(&set).unwrap();
        assert!(!library.toggle_cue(&b.id).unwrap());

        for _ in 0..20 {
            assert_eq!(library.pick(&mut rng).unwrap().id, a.id);
        }
    }

    #[test]
    fn removing_a_cue_drops_it_from_sets() {
        let mut library = CueLibrary::default();
        let a = library.add_cue("A", "a.wav", 440.0);
        let set = library.create_set("night", vec![a.id.clone()]);
        library.activate_set(&set).unwrap();

        library.remove_cue(&a.id);
        assert!(library.cues.is_empty());
        assert!(library.active_set().unwrap().cue_ids.is_empty());
        assert!(library.enabled_cues_in_active_set().is_empty());
    }

    #[test]
    fn activating_unknown_set_fails() {
        let mut library = CueLibrary::starter();
        assert!(library.activate_set("nope").is_err());
        assert_eq!(library.enabled_cues_in_active_set().len(), 1);
    }

    #[test]
    fn only_one_set_is_active() {
        let mut library = CueLibrary::default();
        let first = library.create_set("one", vec![]);
        let second = library.create_set("two", vec![]);
        library.activate_set(&first).unwrap();
        library.activate_set(&second).unwrap();

        let active: Vec<_> = library.sets.iter().filter(|s| s.is_active).collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, second);
    }
}
