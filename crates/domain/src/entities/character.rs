//! Player character sheet carried alongside the narrative state.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterStats {
    pub health: u32,
    pub max_health: u32,
    pub strength: u32,
    pub dexterity: u32,
    pub intelligence: u32,
    pub level: u32,
    pub experience: u32,
}

impl CharacterStats {
    pub fn new(
        health: u32,
        max_health: u32,
        strength: u32,
        dexterity: u32,
        intelligence: u32,
        level: u32,
        experience: u32,
    ) -> Result<Self, DomainError> {
        if health > max_health {
            return Err(DomainError::validation("health cannot exceed max_health"));
        }
        Ok(Self {
            health,
            max_health,
            strength,
            dexterity,
            intelligence,
            level,
            experience,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub name: String,
    pub description: String,
    pub quantity: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inventory {
    items: BTreeMap<String, Item>,
    pub capacity: u32,
    pub gold: u32,
}

impl Inventory {
    pub fn new(capacity: u32, gold: u32) -> Self {
        Self {
            items: BTreeMap::new(),
            capacity,
            gold,
        }
    }

    pub fn items(&self) -> &BTreeMap<String, Item> {
        &self.items
    }

    pub fn add_item(&mut self, item: Item) -> Result<(), DomainError> {
        if !self.items.contains_key(&item.name) && self.items.len() as u32 >= self.capacity {
            return Err(DomainError::container_full(
                self.items.len() as u32,
                self.capacity,
            ));
        }
        self.items.insert(item.name.clone(), item);
        Ok(())
    }

    pub fn remove_item(&mut self, name: &str) -> Option<Item> {
        self.items.remove(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Character {
    pub stats: CharacterStats,
    pub inventory: Inventory,
}
