//! Health accumulator persistence.
//!
//! # Responsibility
//! - Load a group's pet, creating it with default health when absent.
//! - Persist health produced by [`Pet::adjust`].
//!
//! # Invariants
//! - Callers mutate health only through `Pet::adjust`; this module stores the
//!   result and never computes health itself.
//! - Write callers hold SQLite's write lock (an IMMEDIATE transaction) between
//!   load and save, so read-modify-write cannot interleave.

use super::{parse_uuid, RepoResult};
use crate::model::pet::Pet;
use crate::model::GroupId;
use rusqlite::{params, Connection, OptionalExtension};

/// Repository interface for pets.
pub trait PetRepository {
    fn get_pet(&self, group_id: GroupId) -> RepoResult<Option<Pet>>;
    /// Returns the pet, inserting a default one first if none exists.
    fn load_or_create(&self, group_id: GroupId) -> RepoResult<Pet>;
    fn save_health(&self, pet: &Pet, updated_at: i64) -> RepoResult<()>;
}

/// SQLite-backed pet repository.
pub struct SqlitePetRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqlitePetRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl PetRepository for SqlitePetRepository<'_> {
    fn get_pet(&self, group_id: GroupId) -> RepoResult<Option<Pet>> {
        let row = self
            .conn
            .query_row(
                "SELECT group_id, name, health, max_health FROM pets WHERE group_id = ?1;",
                [group_id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>("group_id")?,
                        row.get::<_, String>("name")?,
                        row.get::<_, i32>("health")?,
                        row.get::<_, i32>("max_health")?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((id_text, name, health, max_health)) => Ok(Some(Pet::from_parts(
                parse_uuid(&id_text, "pets.group_id")?,
                name,
                health,
                max_health,
            ))),
            None => Ok(None),
        }
    }

    fn load_or_create(&self, group_id: GroupId) -> RepoResult<Pet> {
        if let Some(pet) = self.get_pet(group_id)? {
            return Ok(pet);
        }

        let pet = Pet::new(group_id);
        self.conn.execute(
            "INSERT OR IGNORE INTO pets (group_id, name, health, max_health)
             VALUES (?1, ?2, ?3, ?4);",
            params![
                group_id.to_string(),
                pet.name.as_str(),
                pet.health(),
                pet.max_health(),
            ],
        )?;

        // Re-read in case another connection created the row first.
        Ok(self.get_pet(group_id)?.unwrap_or(pet))
    }

    fn save_health(&self, pet: &Pet, updated_at: i64) -> RepoResult<()> {
        self.conn.execute(
            "UPDATE pets SET health = ?2, updated_at = ?3 WHERE group_id = ?1;",
            params![pet.group_id.to_string(), pet.health(), updated_at],
        )?;
        Ok(())
    }
}
