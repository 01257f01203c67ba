//! Rejestr zaufania: whitelist/blacklist per gildia + ochrona strukturalna
//! (właściciel, rola wyżej niż bot, sam bot).
//!
//! Whitelist/blacklist żyją tylko w pamięci procesu. Blacklist jest informacyjna:
//! nic tu jej nie egzekwuje.

use std::collections::HashSet;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use dashmap::DashMap;
use moka::future::Cache;
use tracing::{debug, warn};

use crate::error::{PlatformError, PlatformResult};
use crate::platform::Platform;

const STRUCT_CACHE_TTL: Duration = Duration::from_secs(60);
const STRUCT_CACHE_CAP: u64 = 10_000;

#[derive(Debug, Default)]
struct GuildTrust {
    whitelist: HashSet<u64>,
    blacklist: HashSet<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListKind {
    White,
    Black,
}

pub struct TrustRegistry {
    guilds: DashMap<u64, Arc<RwLock<GuildTrust>>>,
    owners: Cache<u64, u64>,
    self_positions: Cache<u64, i64>,
}

impl Default for TrustRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TrustRegistry {
    pub fn new() -> Self {
        Self {
            guilds: DashMap::new(),
            owners: Cache::builder()
                .time_to_live(STRUCT_CACHE_TTL)
                .max_capacity(STRUCT_CACHE_CAP)
                .build(),
            self_positions: Cache::builder()
                .time_to_live(STRUCT_CACHE_TTL)
                .max_capacity(STRUCT_CACHE_CAP)
                .build(),
        }
    }

    /* ==============================
       Whitelist / blacklist
       ============================== */

    pub fn is_whitelisted(&self, guild_id: u64, actor_id: u64) -> bool {
        self.contains(guild_id, actor_id, ListKind::White)
    }

    pub fn is_blacklisted(&self, guild_id: u64, actor_id: u64) -> bool {
        self.contains(guild_id, actor_id, ListKind::Black)
    }

    /// Zwraca `true`, jeśli wpis faktycznie doszedł. Ponowne dodanie to no-op.
    pub fn add_to_whitelist(&self, guild_id: u64, actor_id: u64) -> bool {
        self.mutate(guild_id, ListKind::White, |set| set.insert(actor_id))
    }

    pub fn remove_from_whitelist(&self, guild_id: u64, actor_id: u64) -> bool {
        self.mutate(guild_id, ListKind::White, |set| set.remove(&actor_id))
    }

    pub fn add_to_blacklist(&self, guild_id: u64, actor_id: u64) -> bool {
        self.mutate(guild_id, ListKind::Black, |set| set.insert(actor_id))
    }

    pub fn remove_from_blacklist(&self, guild_id: u64, actor_id: u64) -> bool {
        self.mutate(guild_id, ListKind::Black, |set| set.remove(&actor_id))
    }

    /// Posortowane id z whitelisty gildii.
    pub fn whitelist(&self, guild_id: u64) -> Vec<u64> {
        self.list(guild_id, ListKind::White)
    }

    pub fn blacklist(&self, guild_id: u64) -> Vec<u64> {
        self.list(guild_id, ListKind::Black)
    }

    fn guild(&self, guild_id: u64) -> Option<Arc<RwLock<GuildTrust>>> {
        self.guilds.get(&guild_id).map(|g| g.clone())
    }

    fn contains(&self, guild_id: u64, actor_id: u64, kind: ListKind) -> bool {
        let Some(g) = self.guild(guild_id) else {
            return false;
        };
        let g = read(&g);
        match kind {
            ListKind::White => g.whitelist.contains(&actor_id),
            ListKind::Black => g.blacklist.contains(&actor_id),
        }
    }

    fn list(&self, guild_id: u64, kind: ListKind) -> Vec<u64> {
        let Some(g) = self.guild(guild_id) else {
            return Vec::new();
        };
        let g = read(&g);
        let set = match kind {
            ListKind::White => &g.whitelist,
            ListKind::Black => &g.blacklist,
        };
        let mut out: Vec<u64> = set.iter().copied().collect();
        out.sort_unstable();
        out
    }

    fn mutate(&self, guild_id: u64, kind: ListKind, f: impl FnOnce(&mut HashSet<u64>) -> bool) -> bool {
        // klon Arc-a: zapis blokuje tylko tę gildię, nie shard DashMapy
        let g = self
            .guilds
            .entry(guild_id)
            .or_insert_with(|| Arc::new(RwLock::new(GuildTrust::default())))
            .clone();
        let mut g = write(&g);
        match kind {
            ListKind::White => f(&mut g.whitelist),
            ListKind::Black => f(&mut g.blacklist),
        }
    }

    /* ==============================
       Ochrona strukturalna
       ============================== */

    /// Właściciel gildii (cache 60 s).
    pub async fn owner_of(&self, api: &dyn Platform, guild_id: u64) -> PlatformResult<u64> {
        self.owners
            .try_get_with(guild_id, async { api.guild_owner(guild_id).await })
            .await
            .map_err(|e| (*e).clone())
    }

    async fn self_position(&self, api: &dyn Platform, guild_id: u64) -> PlatformResult<i64> {
        let me = api.self_id();
        self.self_positions
            .try_get_with(guild_id, async { api.top_role_position(guild_id, me).await })
            .await
            .map_err(|e| (*e).clone())
    }

    /// Sam bot, właściciel gildii albo ktoś z rolą co najmniej tak wysoką jak bot.
    /// Błąd odczytu = chroniony (bez pewności nie karzemy).
    pub async fn is_structurally_protected(&self, api: &dyn Platform, guild_id: u64, actor_id: u64) -> bool {
        let me = api.self_id();
        if actor_id == me {
            return true;
        }

        match self.owner_of(api, guild_id).await {
            Ok(owner) if owner == actor_id => return true,
            Ok(_) => {}
            Err(e) => {
                warn!(guild_id, actor_id, error = ?e, "owner lookup failed, treating actor as protected");
                return true;
            }
        }

        let my_pos = match self.self_position(api, guild_id).await {
            Ok(p) => p,
            Err(e) => {
                warn!(guild_id, error = ?e, "self role lookup failed, treating actor as protected");
                return true;
            }
        };

        match api.top_role_position(guild_id, actor_id).await {
            Ok(pos) => {
                let outranks = pos >= my_pos;
                if outranks {
                    debug!(guild_id, actor_id, pos, my_pos, "actor is not below the bot in role hierarchy");
                }
                outranks
            }
            // nie ma go już na serwerze: hierarchia go nie chroni
            Err(PlatformError::NotFound) => false,
            Err(e) => {
                warn!(guild_id, actor_id, error = ?e, "member role lookup failed, treating actor as protected");
                true
            }
        }
    }

    /// Whitelist albo ochrona strukturalna.
    pub async fn is_protected(&self, api: &dyn Platform, guild_id: u64, actor_id: u64) -> bool {
        self.is_whitelisted(guild_id, actor_id) || self.is_structurally_protected(api, guild_id, actor_id).await
    }
}

fn read(lock: &RwLock<GuildTrust>) -> RwLockReadGuard<'_, GuildTrust> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write(lock: &RwLock<GuildTrust>) -> RwLockWriteGuard<'_, GuildTrust> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}
