//! Text command parsing and the processor that turns a player's line into a reply.
//!
//! Every verb resolves against the record store, the content tables and the
//! encounter registry. Replies are plain text; rejections are rendered as
//! messages and never surface as errors to the caller.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use chrono::Utc;
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::game::combat::{CombatState, FocusSkill, Outcome, PlayerAction, FOCUS_CAP};
use crate::game::content::{ContentTables, GearStats};
use crate::game::crafting::{craft, CraftReport};
use crate::game::dice::live_dice;
use crate::game::dungeon::{finish, start_dungeon, DungeonPhase, DungeonRun, DungeonSummary};
use crate::game::encounters::{ActionLock, Encounter, EncounterRegistry};
use crate::game::equipment::{active_sets, derive_combatant, equip, unequip};
use crate::game::errors::GameError;
use crate::game::gathering::{gather, Catch, GatherReport};
use crate::game::hunt::{auto_resolve, play_round, settle_hunt, start_hunt, Hunt, HuntSummary};
use crate::game::inventory::describe_items;
use crate::game::npc::{choose, find_npc, npcs_here, render_node, DialogueStep};
use crate::game::progression::{collection_threshold, regenerate_stamina, rest, xp_threshold, XpAward};
use crate::game::quest::{abandon_quest, accept_quest, available_quests, complete_quest, record_progress};
use crate::game::storage::GameStore;
use crate::game::types::{CollectionKind, GearSlot, ObjectiveKind, PlayerId, PlayerRecord, Skill};
use crate::game::GameRules;
use crate::logutil::escape_log;

const MAX_NAME_LEN: usize = 24;
const LOG_TAIL: usize = 3;

/// Parsed player input.
#[derive(Debug, Clone, PartialEq)]
pub enum GameCommand {
    Register(String),
    Profile,
    Inventory,
    Equipment,
    Equip { instance_id: String, slot: Option<GearSlot> },
    Unequip(String),
    Travel { area: String, subarea: String },
    Gather(Skill),
    Craft { recipe: String, amount: u32 },
    Hunt { auto: bool },
    Dungeon { floor: u32 },
    /// attack / defend / flee / focus, optionally aimed at another player's encounter
    Action { action: PlayerAction, owner: Option<PlayerId> },
    Collections,
    Inspect(String),
    Area,
    Talk { npc: Option<String>, choice: Option<usize> },
    Quests,
    QuestAccept(String),
    QuestComplete(String),
    QuestAbandon(String),
    Rest(u32),
    Help,
    /// Recognised verb with bad arguments; carries the usage line.
    Invalid(String),
    Unknown(String),
}

fn parse_owner(arg: Option<&&str>, usage: &str) -> Result<Option<PlayerId>, GameCommand> {
    match arg {
        None => Ok(None),
        Some(raw) => raw
            .parse::<PlayerId>()
            .map(Some)
            .map_err(|_| GameCommand::Invalid(usage.to_string())),
    }
}

fn combat_action(action: PlayerAction, owner: Option<&&str>, usage: &str) -> GameCommand {
    match parse_owner(owner, usage) {
        Ok(owner) => GameCommand::Action { action, owner },
        Err(invalid) => invalid,
    }
}

impl GameCommand {
    /// Parse one input line. Verbs are case-insensitive; arguments other than
    /// a registration name are lowercased.
    pub fn parse(input: &str) -> GameCommand {
        let trimmed = input.trim();
        let mut words = trimmed.split_whitespace();
        let Some(verb) = words.next() else {
            return GameCommand::Unknown(String::new());
        };
        let verb = verb.to_ascii_lowercase();
        let raw_args: Vec<&str> = words.collect();
        let lowered: Vec<String> = raw_args.iter().map(|a| a.to_ascii_lowercase()).collect();
        let args: Vec<&str> = lowered.iter().map(String::as_str).collect();

        match verb.as_str() {
            "register" => {
                if raw_args.is_empty() {
                    GameCommand::Invalid("Usage: register <name>".to_string())
                } else {
                    GameCommand::Register(raw_args.join(" "))
                }
            }
            "profile" | "p" | "stats" => GameCommand::Profile,
            "inventory" | "inv" | "i" => GameCommand::Inventory,
            "equipment" | "gear" | "eq" => GameCommand::Equipment,
            "equip" => match args.split_first() {
                None => GameCommand::Invalid("Usage: equip <id> [slot]".to_string()),
                Some((id, [])) => GameCommand::Equip { instance_id: id.to_string(), slot: None },
                Some((id, rest)) => match GearSlot::parse(&rest.join(" ")) {
                    Some(slot) => GameCommand::Equip { instance_id: id.to_string(), slot: Some(slot) },
                    None => GameCommand::Invalid(format!("Unknown slot '{}'.", rest.join(" "))),
                },
            },
            "unequip" => {
                if args.is_empty() {
                    GameCommand::Invalid("Usage: unequip <slot|id>".to_string())
                } else {
                    GameCommand::Unequip(args.join(" "))
                }
            }
            "travel" | "go" => match args.as_slice() {
                [area, subarea] => GameCommand::Travel {
                    area: area.to_string(),
                    subarea: subarea.to_string(),
                },
                _ => GameCommand::Invalid("Usage: travel <area> <subarea>".to_string()),
            },
            "mine" => GameCommand::Gather(Skill::Mining),
            "fish" => GameCommand::Gather(Skill::Fishing),
            "forage" => GameCommand::Gather(Skill::Foraging),
            "farm" => GameCommand::Gather(Skill::Farming),
            "scavenge" => GameCommand::Gather(Skill::Scavenging),
            "craft" => match args.as_slice() {
                [recipe] => GameCommand::Craft { recipe: recipe.to_string(), amount: 1 },
                [recipe, amount] => match amount.parse::<u32>() {
                    Ok(amount) if amount > 0 => {
                        GameCommand::Craft { recipe: recipe.to_string(), amount }
                    }
                    _ => GameCommand::Invalid("Usage: craft <recipe> [amount]".to_string()),
                },
                _ => GameCommand::Invalid("Usage: craft <recipe> [amount]".to_string()),
            },
            "hunt" => match args.as_slice() {
                [] => GameCommand::Hunt { auto: false },
                ["auto"] => GameCommand::Hunt { auto: true },
                _ => GameCommand::Invalid("Usage: hunt [auto]".to_string()),
            },
            "dungeon" => match args.as_slice() {
                [] => GameCommand::Dungeon { floor: 1 },
                [floor] => match floor.parse::<u32>() {
                    Ok(floor) => GameCommand::Dungeon { floor },
                    Err(_) => GameCommand::Invalid("Usage: dungeon [floor]".to_string()),
                },
                _ => GameCommand::Invalid("Usage: dungeon [floor]".to_string()),
            },
            "attack" | "a" => combat_action(PlayerAction::Attack, args.first(), "Usage: attack [owner]"),
            "defend" | "d" => combat_action(PlayerAction::Defend, args.first(), "Usage: defend [owner]"),
            "flee" | "run" => combat_action(PlayerAction::Flee, args.first(), "Usage: flee [owner]"),
            "focus" => {
                let usage = "Usage: focus heal|counter [owner]";
                match args.first().and_then(|s| FocusSkill::parse(s)) {
                    Some(skill) => combat_action(PlayerAction::Focus(skill), args.get(1), usage),
                    None => GameCommand::Invalid(usage.to_string()),
                }
            }
            "collections" | "coll" => GameCommand::Collections,
            "inspect" | "look" => {
                if args.is_empty() {
                    GameCommand::Invalid("Usage: inspect <item|gear id>".to_string())
                } else {
                    GameCommand::Inspect(args.join("_"))
                }
            }
            "area" | "where" => GameCommand::Area,
            "talk" => match args.as_slice() {
                [] => GameCommand::Talk { npc: None, choice: None },
                [npc] => GameCommand::Talk { npc: Some(npc.to_string()), choice: None },
                [npc, choice] => match choice.parse::<usize>() {
                    Ok(choice) => GameCommand::Talk { npc: Some(npc.to_string()), choice: Some(choice) },
                    Err(_) => GameCommand::Invalid("Usage: talk [npc] [option]".to_string()),
                },
                _ => GameCommand::Invalid("Usage: talk [npc] [option]".to_string()),
            },
            "quests" => GameCommand::Quests,
            "quest" => match args.as_slice() {
                ["accept", id] => GameCommand::QuestAccept(id.to_string()),
                ["complete", id] => GameCommand::QuestComplete(id.to_string()),
                ["abandon", id] => GameCommand::QuestAbandon(id.to_string()),
                [] => GameCommand::Quests,
                _ => GameCommand::Invalid("Usage: quest accept|complete|abandon <id>".to_string()),
            },
            "rest" => match args.as_slice() {
                [hp] => match hp.parse::<u32>() {
                    Ok(hp) => GameCommand::Rest(hp),
                    Err(_) => GameCommand::Invalid("Usage: rest <target hp>".to_string()),
                },
                _ => GameCommand::Invalid("Usage: rest <target hp>".to_string()),
            },
            "help" | "h" | "?" => GameCommand::Help,
            _ => GameCommand::Unknown(trimmed.to_string()),
        }
    }
}

/// Routes parsed commands to the game modules and renders replies.
pub struct CommandProcessor {
    store: Arc<GameStore>,
    content: Arc<ContentTables>,
    registry: EncounterRegistry,
    rules: GameRules,
    start_area: String,
    start_subarea: String,
    rng: Mutex<StdRng>,
    /// Open NPC conversations: player -> (npc id, current node).
    conversations: Mutex<HashMap<PlayerId, (String, String)>>,
}

impl CommandProcessor {
    pub fn new(store: Arc<GameStore>, content: Arc<ContentTables>, rules: GameRules) -> Self {
        Self {
            store,
            content,
            registry: EncounterRegistry::new(rules.turn_timeout),
            rules,
            start_area: "plains".to_string(),
            start_subarea: "pond".to_string(),
            rng: Mutex::new(live_dice()),
            conversations: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the entropy-seeded random source with a reproducible one.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    /// Where new players spawn.
    pub fn with_start(mut self, area: &str, subarea: &str) -> Self {
        self.start_area = area.to_ascii_lowercase();
        self.start_subarea = subarea.to_ascii_lowercase();
        self
    }

    pub fn registry(&self) -> &EncounterRegistry {
        &self.registry
    }

    pub fn store(&self) -> &GameStore {
        &self.store
    }

    fn dice(&self) -> MutexGuard<'_, StdRng> {
        self.rng.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Handle one line from `player_id` and return the reply.
    ///
    /// Blocks on the record store; async callers should run it on a blocking task.
    pub fn handle(&self, player_id: PlayerId, line: &str) -> String {
        let command = GameCommand::parse(line);
        debug!(
            "command from {}: line={} parsed={:?}",
            player_id,
            escape_log(line),
            command
        );
        match self.dispatch(player_id, command) {
            Ok(reply) => reply,
            Err(e) => {
                if e.is_rejection() {
                    debug!("rejected command from {}: {}", player_id, e);
                }
                self.reject(player_id, e)
            }
        }
    }

    /// Settle every encounter idle for longer than the turn timeout.
    ///
    /// Returns one notice per settled encounter, addressed to its owner.
    pub fn sweep(&self, now: Instant) -> Vec<(PlayerId, String)> {
        let mut notices = Vec::new();
        for (player, encounter) in self.registry.expire_idle(now) {
            match self.settle(encounter) {
                Ok(summary) => notices.push((player, format!("Time's up!\n{}", summary))),
                Err(e) => error!("failed to settle timed-out encounter for {}: {}", player, e),
            }
        }
        notices
    }

    fn reject(&self, player_id: PlayerId, err: GameError) -> String {
        match err {
            GameError::NotRegistered => "You haven't registered yet. Use: register <name>".to_string(),
            GameError::AlreadyRegistered => "You're already registered.".to_string(),
            GameError::AlreadyInEncounter => {
                "You're already in an encounter. Finish it first.".to_string()
            }
            GameError::NoStamina => "You're out of stamina. Rest a while and try again.".to_string(),
            GameError::Unauthorized => "That's not your fight.".to_string(),
            GameError::NoActiveEncounter => "You're not in an encounter.".to_string(),
            GameError::ActionInFlight => "Hold on, your last action is still resolving.".to_string(),
            GameError::Precondition(msg) => msg,
            GameError::NotFound(what) => format!("You don't own anything called '{}'.", what),
            GameError::MissingContent(what) => {
                warn!("player {} hit missing content: {}", player_id, what);
                format!("That isn't available right now ({}).", what)
            }
            other => {
                error!("command for player {} failed: {}", player_id, other);
                "Something went wrong. Please try again later.".to_string()
            }
        }
    }

    fn dispatch(&self, player_id: PlayerId, command: GameCommand) -> Result<String, GameError> {
        match command {
            GameCommand::Register(name) => self.handle_register(player_id, &name),
            GameCommand::Profile => self.handle_profile(player_id),
            GameCommand::Inventory => self.handle_inventory(player_id),
            GameCommand::Equipment => self.handle_equipment(player_id),
            GameCommand::Equip { instance_id, slot } => self.handle_equip(player_id, &instance_id, slot),
            GameCommand::Unequip(target) => self.handle_unequip(player_id, &target),
            GameCommand::Travel { area, subarea } => self.handle_travel(player_id, &area, &subarea),
            GameCommand::Gather(skill) => self.handle_gather(player_id, skill),
            GameCommand::Craft { recipe, amount } => self.handle_craft(player_id, &recipe, amount),
            GameCommand::Hunt { auto } => self.handle_hunt(player_id, auto),
            GameCommand::Dungeon { floor } => self.handle_dungeon(player_id, floor),
            GameCommand::Action { action, owner } => {
                self.handle_action(player_id, owner.unwrap_or(player_id), action)
            }
            GameCommand::Collections => self.handle_collections(player_id),
            GameCommand::Inspect(target) => self.handle_inspect(player_id, &target),
            GameCommand::Area => self.handle_area(player_id),
            GameCommand::Talk { npc, choice } => self.handle_talk(player_id, npc.as_deref(), choice),
            GameCommand::Quests => self.handle_quests(player_id),
            GameCommand::QuestAccept(id) => self.handle_quest_accept(player_id, &id),
            GameCommand::QuestComplete(id) => self.handle_quest_complete(player_id, &id),
            GameCommand::QuestAbandon(id) => {
                self.store
                    .update_player(player_id, |p| abandon_quest(p, &id))?;
                Ok(format!("Quest {} abandoned.", id))
            }
            GameCommand::Rest(hp) => self.handle_rest(player_id, hp),
            GameCommand::Help => Ok(help_text()),
            GameCommand::Invalid(usage) => Ok(usage),
            GameCommand::Unknown(cmd) => Ok(format!(
                "Unknown command: '{}'\nType HELP for available commands.",
                cmd
            )),
        }
    }

    fn handle_register(&self, player_id: PlayerId, name: &str) -> Result<String, GameError> {
        let name = name.trim();
        if name.chars().count() > MAX_NAME_LEN || name.chars().any(char::is_control) {
            return Err(GameError::Precondition(format!(
                "Names must be at most {} printable characters.",
                MAX_NAME_LEN
            )));
        }
        let mut player = PlayerRecord::new(player_id, name, &self.start_area, &self.start_subarea);
        player.general.max_stamina = self.rules.max_stamina;
        player.general.stamina = self.rules.max_stamina;
        self.store.insert_player(player)?;
        info!("registered player {} as {}", player_id, escape_log(name));
        Ok(format!(
            "Welcome to Starfall, {}!\nYou arrive at {} / {}. Type HELP for commands.",
            name, self.start_area, self.start_subarea
        ))
    }

    fn handle_profile(&self, player_id: PlayerId) -> Result<String, GameError> {
        let now = Utc::now();
        let regen = self.rules.stamina_regen_secs;
        let player = self.store.update_player(player_id, |p| {
            regenerate_stamina(&mut p.general, now, regen);
            Ok(p.clone())
        })?;
        let g = &player.general;
        let derived = derive_combatant(&player, &self.content);
        let mut out = String::new();
        let _ = writeln!(out, "=== {} ===", g.name);
        let _ = writeln!(
            out,
            "HP {}/{} | Stamina {}/{} | Gold {}",
            g.hp, g.max_hp, g.stamina, g.max_stamina, g.wallet
        );
        let _ = writeln!(
            out,
            "STR {} DEF {} EVA {} ACC {} | Crit {:.0}% | Power {}",
            derived.strength,
            derived.defense,
            derived.evasion,
            derived.accuracy,
            derived.crit_chance * 100.0,
            g.power_rating
        );
        let _ = writeln!(out, "Location: {} / {}", player.location.area, player.location.subarea);
        if !g.crates.is_empty() {
            let crates: Vec<String> = g
                .crates
                .iter()
                .map(|(tier, count)| format!("{} x{}", tier.label(), count))
                .collect();
            let _ = writeln!(out, "Crates: {}", crates.join(", "));
        }
        out.push_str("Skills:\n");
        for skill in Skill::ALL {
            let progress = player.skills.get(skill);
            let _ = write!(
                out,
                "  {:<10} L{} ({}/{} xp)",
                skill.name(),
                progress.level,
                progress.xp,
                xp_threshold(progress.level)
            );
            if let Some(essence) = g.essence.get(&skill) {
                let _ = write!(out, " essence {:.2}", essence);
            }
            out.push('\n');
        }
        Ok(out.trim_end().to_string())
    }

    fn handle_inventory(&self, player_id: PlayerId) -> Result<String, GameError> {
        let player = self.store.get_player(player_id)?;
        Ok(format!(
            "Inventory ({}/{}): {}",
            player.inventory.total_units(),
            player.general.max_inventory,
            describe_items(&player.inventory.items)
        ))
    }

    fn handle_equipment(&self, player_id: PlayerId) -> Result<String, GameError> {
        let player = self.store.get_player(player_id)?;
        let template_name = |template: &str| {
            self.content
                .template(template)
                .map(|t| t.name.clone())
                .unwrap_or_else(|| template.to_string())
        };
        let mut out = String::from("Equipped:\n");
        let mut any = false;
        for (slot, gear) in player.equipment.equipped_instances() {
            any = true;
            let _ = writeln!(out, "  {}: {} [{}]", slot, template_name(&gear.template), gear.instance_id);
        }
        if !any {
            out.push_str("  nothing\n");
        }
        let spare: Vec<String> = player
            .equipment
            .instances
            .iter()
            .filter(|g| player.equipment.slot_of(&g.instance_id).is_none())
            .map(|g| format!("{} [{}]", template_name(&g.template), g.instance_id))
            .collect();
        if !spare.is_empty() {
            let _ = writeln!(out, "Unequipped: {}", spare.join(", "));
        }
        for (set, pieces) in active_sets(&player, &self.content) {
            let _ = writeln!(out, "Set: {} ({} pieces)", set, pieces);
        }
        Ok(out.trim_end().to_string())
    }

    fn handle_equip(
        &self,
        player_id: PlayerId,
        instance_id: &str,
        slot: Option<GearSlot>,
    ) -> Result<String, GameError> {
        let content = &self.content;
        let (slot, name) = self.store.update_player(player_id, |p| {
            let slot = equip(p, instance_id, slot, content)?;
            let name = p
                .equipment
                .instance(instance_id)
                .and_then(|g| content.template(&g.template))
                .map(|t| t.name.clone())
                .unwrap_or_else(|| instance_id.to_string());
            Ok((slot, name))
        })?;
        Ok(format!("Equipped {} in {}.", name, slot))
    }

    fn handle_unequip(&self, player_id: PlayerId, target: &str) -> Result<String, GameError> {
        let (slot, instance_id) = self.store.update_player(player_id, |p| unequip(p, target))?;
        Ok(format!("Removed [{}] from {}.", instance_id, slot))
    }

    fn handle_travel(&self, player_id: PlayerId, area: &str, subarea: &str) -> Result<String, GameError> {
        self.store.get_player(player_id)?;
        if self.registry.has_encounter(player_id) {
            return Err(GameError::AlreadyInEncounter);
        }
        if self.content.subarea(area, subarea).is_none() {
            return Err(GameError::Precondition(format!(
                "There is no place called {} / {}.",
                area, subarea
            )));
        }
        let ready = self.store.update_player(player_id, |p| {
            p.location.area = area.to_string();
            p.location.subarea = subarea.to_string();
            let mut ready = record_progress(p, ObjectiveKind::Explore, area, 1);
            ready.extend(record_progress(p, ObjectiveKind::Explore, subarea, 1));
            Ok(ready)
        })?;
        let mut out = format!("You travel to {} / {}.", area, subarea);
        push_quests_ready(&mut out, &ready);
        Ok(out)
    }

    fn handle_gather(&self, player_id: PlayerId, skill: Skill) -> Result<String, GameError> {
        let now = Utc::now();
        let mut dice = self.dice();
        let report = self.store.update_player(player_id, |p| {
            gather(p, skill, &self.content, &self.rules, now, &mut *dice)
        })?;
        Ok(render_gather(&report))
    }

    fn handle_craft(&self, player_id: PlayerId, recipe: &str, amount: u32) -> Result<String, GameError> {
        let now = Utc::now();
        let report = self.store.update_player(player_id, |p| {
            craft(p, recipe, amount, &self.content, &self.rules, now)
        })?;
        Ok(render_craft(&report, &self.content))
    }

    fn handle_rest(&self, player_id: PlayerId, target_hp: u32) -> Result<String, GameError> {
        self.store.get_player(player_id)?;
        if self.registry.has_encounter(player_id) {
            return Err(GameError::AlreadyInEncounter);
        }
        let now = Utc::now();
        let regen = self.rules.stamina_regen_secs;
        let (spent, stamina) = self.store.update_player(player_id, |p| {
            regenerate_stamina(&mut p.general, now, regen);
            let spent = rest(&mut p.general, target_hp)?;
            Ok((spent, p.general.stamina))
        })?;
        Ok(format!(
            "You rest and recover to {} HP (-{} stamina, {} left).",
            target_hp, spent, stamina
        ))
    }

    /// Settle an idle encounter held under `lock` before anything else touches it.
    fn expire_if_idle(&self, lock: &mut ActionLock, now: Instant) -> Result<Option<String>, GameError> {
        if !lock.is_idle(now, self.registry.timeout()) {
            return Ok(None);
        }
        match lock.take() {
            Some(encounter) => {
                info!("player {} encounter timed out", lock.player());
                let summary = self.settle(encounter.into_timed_out())?;
                Ok(Some(format!("Your last encounter timed out.\n{}", summary)))
            }
            None => Ok(None),
        }
    }

    fn handle_hunt(&self, player_id: PlayerId, auto: bool) -> Result<String, GameError> {
        let mut lock = self.registry.begin(player_id)?;
        let expired = self.expire_if_idle(&mut lock, Instant::now())?;
        if lock.encounter().is_some() {
            return Err(GameError::AlreadyInEncounter);
        }
        let now = Utc::now();
        let hunt = {
            let mut dice = self.dice();
            self.store.update_player(player_id, |p| {
                start_hunt(p, &self.content, &self.rules, now, &mut *dice)
            })?
        };
        let mut out = expired.map(|s| s + "\n\n").unwrap_or_default();
        if auto {
            let hunt = {
                let mut dice = self.dice();
                auto_resolve(hunt, self.rules.auto_round_limit, &mut *dice)
            };
            out.push_str(&self.settle(Encounter::Hunt(hunt))?);
        } else {
            out.push_str(&render_hunt(&hunt));
            lock.put(Encounter::Hunt(hunt), Instant::now());
        }
        Ok(out)
    }

    fn handle_dungeon(&self, player_id: PlayerId, floor: u32) -> Result<String, GameError> {
        let mut lock = self.registry.begin(player_id)?;
        let expired = self.expire_if_idle(&mut lock, Instant::now())?;
        if lock.encounter().is_some() {
            return Err(GameError::AlreadyInEncounter);
        }
        let run = {
            let mut dice = self.dice();
            self.store.update_player(player_id, |p| {
                start_dungeon(p, floor, &self.content, &self.rules, &mut *dice)
            })?
        };
        let mut out = expired.map(|s| s + "\n\n").unwrap_or_default();
        if run.is_over() {
            out.push_str(&self.settle(Encounter::Dungeon(run))?);
        } else {
            out.push_str(&render_dungeon(&run));
            lock.put(Encounter::Dungeon(run), Instant::now());
        }
        Ok(out)
    }

    fn handle_action(
        &self,
        actor: PlayerId,
        owner: PlayerId,
        action: PlayerAction,
    ) -> Result<String, GameError> {
        let mut lock = self.registry.act(actor, owner)?;
        if let Some(summary) = self.expire_if_idle(&mut lock, Instant::now())? {
            return Ok(summary);
        }
        let encounter = lock.take().ok_or(GameError::NoActiveEncounter)?;
        let encounter = match encounter {
            Encounter::Hunt(hunt) => {
                let (hunt, _) = {
                    let mut dice = self.dice();
                    play_round(hunt, action, &mut *dice)
                };
                Encounter::Hunt(hunt)
            }
            Encounter::Dungeon(mut run) => {
                let result = {
                    let mut dice = self.dice();
                    run.act(action, &self.content, &mut *dice)
                };
                if let Err(e) = result {
                    lock.put(Encounter::Dungeon(run), Instant::now());
                    return Err(e);
                }
                Encounter::Dungeon(run)
            }
        };
        if encounter.is_over() {
            let tail = match &encounter {
                Encounter::Hunt(hunt) => render_log_tail(&hunt.log),
                Encounter::Dungeon(run) => render_log_tail(&run.log),
            };
            let summary = self.settle(encounter)?;
            return Ok(format!("{}\n{}", tail, summary));
        }
        let view = match &encounter {
            Encounter::Hunt(hunt) => render_hunt(hunt),
            Encounter::Dungeon(run) => render_dungeon(run),
        };
        lock.put(encounter, Instant::now());
        Ok(view)
    }

    /// Persist a finished (or abandoned) encounter and render its summary.
    fn settle(&self, encounter: Encounter) -> Result<String, GameError> {
        match encounter {
            Encounter::Hunt(hunt) => {
                let summary = {
                    let mut dice = self.dice();
                    self.store
                        .update_player(hunt.player_id, |p| Ok(settle_hunt(p, &hunt, &mut *dice)))?
                };
                Ok(render_hunt_summary(&summary))
            }
            Encounter::Dungeon(run) => {
                let summary = self.store.update_player(run.player_id, |p| Ok(finish(p, &run)))?;
                Ok(render_dungeon_summary(&summary))
            }
        }
    }

    fn handle_collections(&self, player_id: PlayerId) -> Result<String, GameError> {
        let player = self.store.get_player(player_id)?;
        let mut out = String::from("Collections:");
        for kind in CollectionKind::ALL {
            let progress = player.collections.get(kind);
            let _ = write!(
                out,
                "\n  {:<5} {} gathered, tier {} (next at {})",
                kind.key(),
                progress.count,
                progress.level,
                collection_threshold(progress.level)
            );
        }
        Ok(out)
    }

    fn handle_inspect(&self, player_id: PlayerId, target: &str) -> Result<String, GameError> {
        let player = self.store.get_player(player_id)?;
        if let Some(item) = self.content.item(target) {
            let mut out = format!("{} [{}]: {}, {} XP per unit", item.name, target, item.kind, item.xp);
            if let Some(kind) = item.collection {
                let _ = write!(out, ", counts toward {}", kind.key());
            }
            let _ = write!(out, "\nYou have {}.", player.inventory.count(target));
            return Ok(out);
        }
        let owned = player.equipment.instance(target);
        let key = owned.map(|g| g.template.as_str()).unwrap_or(target);
        let Some(template) = self.content.template(key) else {
            return Err(GameError::Precondition(format!("There's no item called '{}'.", target)));
        };
        let slots: Vec<&str> = template.equip_slots.iter().map(|s| s.label()).collect();
        let mut out = format!("{} [{}]: {}", template.name, key, slots.join(" / "));
        let stats = describe_gear_stats(&template.stats);
        if !stats.is_empty() {
            let _ = write!(out, "\n{}", stats);
        }
        if let Some(set) = &template.set {
            let _ = write!(out, "\nPart of the {} set.", set);
        }
        if let Ok(recipe) = self.content.recipe(key) {
            let _ = write!(out, "\nCrafted from {}.", describe_items(&recipe.ingredients));
        }
        match owned {
            Some(gear) => {
                let place = player
                    .equipment
                    .slot_of(&gear.instance_id)
                    .map(|slot| format!("equipped in {}", slot))
                    .unwrap_or_else(|| "not equipped".to_string());
                let _ = write!(out, "\nYour copy [{}] is {}.", gear.instance_id, place);
            }
            None => {
                let copies = player.equipment.instances.iter().filter(|g| g.template == key).count();
                let _ = write!(out, "\nYou own {}.", copies);
            }
        }
        Ok(out)
    }

    fn handle_area(&self, player_id: PlayerId) -> Result<String, GameError> {
        let player = self.store.get_player(player_id)?;
        let here = &player.location;
        let area = self.content.areas.get(&here.area).ok_or_else(|| {
            GameError::MissingContent(format!("area {}", here.area))
        })?;
        let mut out = format!("=== {} ({}) ===", area.name.as_deref().unwrap_or(&here.area), here.area);
        for (key, sub) in &area.sub_areas {
            let marker = if *key == here.subarea { ">" } else { " " };
            let _ = write!(out, "\n{} {}", marker, key);
            if !sub.mobs.is_empty() {
                let _ = write!(out, " | creatures: {}", sub.mobs.join(", "));
            }
            if !sub.resources.is_empty() {
                let _ = write!(out, " | resources: {}", sub.resources.join(", "));
            }
            let people: Vec<&str> = npcs_here(&self.content, &here.area, key)
                .into_iter()
                .map(|(_, npc)| npc.name.as_str())
                .collect();
            if !people.is_empty() {
                let _ = write!(out, " | people: {}", people.join(", "));
            }
        }
        Ok(out)
    }

    fn conversations(&self) -> MutexGuard<'_, HashMap<PlayerId, (String, String)>> {
        self.conversations.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handle_talk(
        &self,
        player_id: PlayerId,
        npc: Option<&str>,
        choice: Option<usize>,
    ) -> Result<String, GameError> {
        let player = self.store.get_player(player_id)?;
        if player.general.in_dungeon || self.registry.has_encounter(player_id) {
            return Err(GameError::AlreadyInEncounter);
        }
        let (area, subarea) = (&player.location.area, &player.location.subarea);
        let Some(wanted) = npc else {
            let here = npcs_here(&self.content, area, subarea);
            if here.is_empty() {
                return Ok("There's nobody here to talk to.".to_string());
            }
            let names: Vec<String> = here
                .iter()
                .map(|(id, npc)| format!("{} [{}]", npc.name, id))
                .collect();
            return Ok(format!("You see: {}\nUse: talk <name>", names.join(", ")));
        };
        let (npc_id, def) = find_npc(&self.content, area, subarea, wanted)?;

        let Some(choice) = choice else {
            let (key, node) = def
                .opening()
                .ok_or_else(|| GameError::MissingContent(format!("dialogue for {}", npc_id)))?;
            self.conversations()
                .insert(player_id, (npc_id.to_string(), key.to_string()));
            let ready = self
                .store
                .update_player(player_id, |p| Ok(record_progress(p, ObjectiveKind::Talk, npc_id, 1)))?;
            let mut out = render_node(def, node);
            push_quests_ready(&mut out, &ready);
            return Ok(out);
        };

        let node_key = match self.conversations().get(&player_id) {
            Some((id, node)) if id == npc_id => node.clone(),
            _ => {
                return Err(GameError::Precondition(format!(
                    "You aren't talking to {}. Use: talk {}",
                    def.name, npc_id
                )))
            }
        };
        match choose(def, &node_key, choice)? {
            DialogueStep::Node { key, node } => {
                self.conversations()
                    .insert(player_id, (npc_id.to_string(), key.to_string()));
                Ok(render_node(def, node))
            }
            DialogueStep::GiveQuest(quest_id) => {
                let name = self.store.update_player(player_id, |p| {
                    accept_quest(p, quest_id, &self.content).map(|q| q.name.clone())
                })?;
                Ok(format!("{} hands you a quest: {}", def.name, name))
            }
            DialogueStep::End(text) => {
                self.conversations().remove(&player_id);
                Ok(format!("{}: {}", def.name, text))
            }
        }
    }

    fn handle_quests(&self, player_id: PlayerId) -> Result<String, GameError> {
        let player = self.store.get_player(player_id)?;
        let mut out = String::new();
        if player.quests.active.is_empty() {
            out.push_str("No active quests.\n");
        } else {
            out.push_str("Active quests:\n");
            for pq in &player.quests.active {
                let name = self
                    .content
                    .quest(&pq.quest_id)
                    .map(|q| q.name.clone())
                    .unwrap_or_else(|_| pq.quest_id.clone());
                let marker = if pq.all_objectives_complete() { " (ready)" } else { "" };
                let _ = writeln!(out, "  {} [{}]{}", name, pq.quest_id, marker);
                for objective in &pq.objectives {
                    let _ = writeln!(
                        out,
                        "    {:?} {}: {}/{}",
                        objective.kind, objective.target, objective.current, objective.required
                    );
                }
            }
        }
        let available = available_quests(&player, &self.content);
        if !available.is_empty() {
            out.push_str("Available:\n");
            for quest in available {
                let _ = writeln!(out, "  {} [{}] - {}", quest.name, quest.quest_id, quest.description);
            }
        }
        Ok(out.trim_end().to_string())
    }

    fn handle_quest_accept(&self, player_id: PlayerId, quest_id: &str) -> Result<String, GameError> {
        let name = self.store.update_player(player_id, |p| {
            accept_quest(p, quest_id, &self.content).map(|q| q.name.clone())
        })?;
        Ok(format!("Quest accepted: {}", name))
    }

    fn handle_quest_complete(&self, player_id: PlayerId, quest_id: &str) -> Result<String, GameError> {
        let done = self
            .store
            .update_player(player_id, |p| complete_quest(p, quest_id, &self.content))?;
        let mut out = format!("Quest complete: {}! +{} gold", done.name, done.gold);
        if let Some(xp) = &done.xp {
            push_xp(&mut out, Skill::Combat, xp);
        }
        if !done.items.is_empty() {
            let _ = write!(out, "\nReceived: {}", done.items.join(", "));
        }
        if !done.recipes.is_empty() {
            let _ = write!(out, "\nRecipes unlocked: {}", done.recipes.join(", "));
        }
        Ok(out)
    }
}

fn help_text() -> String {
    [
        "Commands:",
        "  register <name> | profile | inventory | equipment",
        "  equip <id> [slot] | unequip <slot|id>",
        "  travel <area> <subarea>",
        "  mine | fish | forage | farm | scavenge",
        "  craft <recipe> [n] | rest <hp>",
        "  hunt [auto] | dungeon [floor]",
        "  attack | defend | flee | focus heal|counter",
        "  quests | quest accept|complete|abandon <id>",
        "  area | collections | inspect <item|id> | talk [npc] [option]",
    ]
    .join("\n")
}

fn push_xp(out: &mut String, skill: Skill, award: &XpAward) {
    if award.leveled_up {
        let _ = write!(out, "\n{} level up! Now level {}.", skill.name(), award.level);
    }
}

fn push_quests_ready(out: &mut String, ready: &[String]) {
    for quest in ready {
        let _ = write!(out, "\nQuest ready to turn in: {}", quest);
    }
}

fn render_log_tail(log: &[String]) -> String {
    let start = log.len().saturating_sub(LOG_TAIL);
    log[start..]
        .iter()
        .map(|line| format!("> {}", line))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_combat(out: &mut String, combat: &CombatState) {
    let you = &combat.player;
    let _ = write!(out, "You: {}/{} HP", you.current_hp, you.max_hp);
    if combat.player_defending {
        out.push_str(" [defending]");
    }
    if combat.rules.focus_enabled {
        let _ = write!(out, " | Focus {}/{}", combat.focus, FOCUS_CAP);
        if combat.countering {
            out.push_str(" [counter ready]");
        }
    }
    out.push('\n');
    if let Some(mob) = combat.current() {
        let _ = write!(out, "{}: {}/{} HP", mob.name(), mob.stats.current_hp, mob.stats.max_hp);
        if mob.is_defending {
            out.push_str(" [defending]");
        }
        out.push('\n');
        if let Some(special) = &mob.telegraphed {
            let _ = writeln!(
                out,
                "! {} lands in {} turn(s). Defend!",
                special.name, mob.telegraph_turns
            );
        }
    }
}

fn render_hunt(hunt: &Hunt) -> String {
    let mut out = format!("=== Hunt: {} ===\n", hunt.mob().name());
    render_combat(&mut out, &hunt.combat);
    out.push_str(&render_log_tail(&hunt.log));
    out.push_str("\nattack | defend | flee");
    out
}

fn render_dungeon(run: &DungeonRun) -> String {
    let mut out = format!(
        "=== Dungeon floor {} - room {}/{} | score {} ===\n",
        run.floor,
        run.current_room + 1,
        run.rooms.len(),
        run.score
    );
    if let Some(combat) = &run.combat {
        render_combat(&mut out, combat);
    }
    out.push_str(&render_log_tail(&run.log));
    out.push_str("\nattack | defend | flee | focus heal|counter");
    out
}

fn render_hunt_summary(summary: &HuntSummary) -> String {
    let mut out = match summary.outcome {
        Outcome::Victory => format!(
            "Victory! You defeated the {}.\n+{} XP, +{} gold",
            summary.mob_name, summary.xp_gained, summary.gold_gained
        ),
        Outcome::Defeat => format!(
            "Defeat... the {} knocked you out.\n+{} XP, -{} gold",
            summary.mob_name, summary.xp_gained, summary.gold_lost
        ),
        Outcome::Fled => format!("You got away from the {}.", summary.mob_name),
    };
    if !summary.loot.is_empty() {
        let _ = write!(out, "\nLoot: {}", describe_items(&summary.loot));
    }
    if let Some(xp) = &summary.xp {
        push_xp(&mut out, Skill::Combat, xp);
    }
    let _ = write!(
        out,
        "\nHP {}/{} | -{} stamina",
        summary.hp, summary.max_hp, summary.stamina_lost
    );
    push_quests_ready(&mut out, &summary.quests_ready);
    out
}

fn render_dungeon_summary(summary: &DungeonSummary) -> String {
    let mut out = match summary.phase {
        DungeonPhase::Complete => format!(
            "Floor {} complete! Grade {} (score {})\n+{} XP, +{} gold",
            summary.floor,
            summary.grade.unwrap_or("F"),
            summary.score,
            summary.xp_gained,
            summary.gold
        ),
        DungeonPhase::PlayerDefeated => format!(
            "You were defeated on floor {} (score {}). Nothing was carried out.",
            summary.floor, summary.score
        ),
        DungeonPhase::TimedOut => format!(
            "You lingered too long and left floor {} (score {}). Nothing was carried out.",
            summary.floor, summary.score
        ),
        _ => format!(
            "You fled floor {} (score {}). Nothing was carried out.",
            summary.floor, summary.score
        ),
    };
    if !summary.loot.is_empty() {
        let _ = write!(out, "\nLoot: {}", describe_items(&summary.loot));
    }
    if let Some(xp) = &summary.xp {
        push_xp(&mut out, Skill::Combat, xp);
    }
    let _ = write!(out, "\nHP {}/{}", summary.hp, summary.max_hp);
    push_quests_ready(&mut out, &summary.quests_ready);
    out
}

fn describe_gear_stats(stats: &GearStats) -> String {
    let mut parts = Vec::new();
    for (label, value) in [
        ("STR", stats.strength),
        ("DEF", stats.defense),
        ("EVA", stats.evasion),
        ("ACC", stats.accuracy),
        ("HP", stats.hp),
    ] {
        if value > 0 {
            parts.push(format!("{} +{}", label, value));
        }
    }
    if stats.crit_chance > 0.0 {
        parts.push(format!("Crit +{:.0}%", stats.crit_chance * 100.0));
    }
    if stats.skill_bonus > 0.0 {
        parts.push(format!("Combat XP +{:.0}%", stats.skill_bonus * 100.0));
    }
    if let Some(multiplier) = stats.yield_multiplier {
        parts.push(format!("Yield x{:.2}", multiplier));
    }
    if let Some(chance) = stats.extra_roll_chance {
        parts.push(format!("Extra roll {:.0}%", chance * 100.0));
    }
    parts.join(", ")
}

fn render_gather(report: &GatherReport) -> String {
    let mut out = match report.catch {
        Catch::Coins(coins) => format!("Treasure! You reel in {} coins", coins),
        Catch::Crate(tier) => format!("Treasure! You reel in a {} crate", tier.label()),
        Catch::Trash => format!("You fish up junk: {} x{}", report.item_name, report.qty),
        Catch::Resource => format!("You gather {} x{}", report.item_name, report.qty),
    };
    if report.bonus_roll {
        out.push_str(" (bonus!)");
    }
    let _ = write!(
        out,
        "\n+{} {} XP, +{:.2} essence | Stamina {}",
        report.xp_gained,
        report.skill.name(),
        report.essence,
        report.stamina
    );
    push_xp(&mut out, report.skill, &report.xp);
    if let Some((kind, tiers)) = &report.collection {
        for tier in tiers {
            let _ = write!(out, "\n{} collection reached tier {}!", kind.key(), tier);
        }
    }
    if !report.unlocked.is_empty() {
        let _ = write!(out, "\nRecipes unlocked: {}", report.unlocked.join(", "));
    }
    push_quests_ready(&mut out, &report.quests_ready);
    out
}

fn render_craft(report: &CraftReport, content: &ContentTables) -> String {
    let name = content
        .template(&report.recipe)
        .map(|t| t.name.clone())
        .or_else(|| content.item(&report.recipe).map(|i| i.name.clone()))
        .unwrap_or_else(|| report.recipe.clone());
    let mut out = if report.gear.is_empty() {
        format!("You craft {} x{}.", name, report.units)
    } else {
        format!("You craft {} [{}].", name, report.gear.join(", "))
    };
    push_xp(&mut out, Skill::Crafting, &report.xp);
    out
}
