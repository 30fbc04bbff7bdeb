//! Slash-command registry
//!
//! An explicit registry populated at startup: each entry pairs a
//! command name with its parameter schema and handler. Handlers return
//! structured results; validation failures surface as short
//! user-visible messages, anything unexpected is logged and answered
//! generically.

pub mod admin;
pub mod nickname;
pub mod roster;
pub mod scan;
pub mod stats;
pub mod team;
pub mod war;

use crate::gateway::{ChatGateway, CommandEvent};
use crate::BotState;
use mkws_common::{Error, Result};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use tracing::error;

/// One invocation, with arguments already split by the platform edge.
#[derive(Debug, Clone)]
pub struct CommandCall {
    pub guild_id: i64,
    pub channel_id: i64,
    pub user_id: i64,
    pub args: HashMap<String, String>,
}

impl CommandCall {
    pub fn arg(&self, name: &str) -> Result<&str> {
        self.opt(name)
            .ok_or_else(|| Error::InvalidInput(format!("missing argument '{}'", name)))
    }

    pub fn opt(&self, name: &str) -> Option<&str> {
        self.args.get(name).map(String::as_str).filter(|s| !s.trim().is_empty())
    }

    pub fn int(&self, name: &str) -> Result<i64> {
        self.arg(name)?
            .trim()
            .parse()
            .map_err(|_| Error::InvalidInput(format!("'{}' must be an integer", name)))
    }

    pub fn opt_int(&self, name: &str) -> Result<Option<i64>> {
        self.opt(name)
            .map(|v| {
                v.trim()
                    .parse()
                    .map_err(|_| Error::InvalidInput(format!("'{}' must be an integer", name)))
            })
            .transpose()
    }
}

pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;

/// Handlers are plain functions so the registry stays a static table.
pub type Handler = for<'a> fn(&'a BotState, &'a dyn ChatGateway, CommandCall) -> HandlerFuture<'a>;

pub struct ParamSpec {
    pub name: &'static str,
    pub required: bool,
}

pub struct CommandSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub params: &'static [ParamSpec],
    pub handler: Handler,
}

pub struct Registry {
    commands: Vec<CommandSpec>,
    index: HashMap<&'static str, usize>,
}

const fn req(name: &'static str) -> ParamSpec {
    ParamSpec { name, required: true }
}

const fn opt(name: &'static str) -> ParamSpec {
    ParamSpec { name, required: false }
}

const SETUP_PARAMS: &[ParamSpec] = &[req("teamname"), req("players"), req("results_channel")];
const SETCHANNEL_PARAMS: &[ParamSpec] = &[req("channel")];
const CHECKPERMISSIONS_PARAMS: &[ParamSpec] = &[req("channel")];
const ADDWAR_PARAMS: &[ParamSpec] = &[req("player_scores"), opt("races")];
const APPENDPLAYERTOWAR_PARAMS: &[ParamSpec] = &[req("war_id"), req("player_scores")];
const REMOVEWAR_PARAMS: &[ParamSpec] = &[req("war_id")];
const SHOWALLWARS_PARAMS: &[ParamSpec] = &[opt("limit")];
const ADDPLAYER_PARAMS: &[ParamSpec] = &[req("name"), opt("member_status")];
const REMOVEPLAYER_PARAMS: &[ParamSpec] = &[req("name")];
const SETMEMBERSTATUS_PARAMS: &[ParamSpec] = &[req("name"), req("status")];
const ROSTER_PARAMS: &[ParamSpec] = &[];
const SHOWTRIALS_PARAMS: &[ParamSpec] = &[];
const SHOWKICKED_PARAMS: &[ParamSpec] = &[];
const ADDTEAM_PARAMS: &[ParamSpec] = &[req("name")];
const REMOVETEAM_PARAMS: &[ParamSpec] = &[req("name")];
const RENAMETEAM_PARAMS: &[ParamSpec] = &[req("old"), req("new")];
const ASSIGNPLAYERS_PARAMS: &[ParamSpec] = &[req("players"), req("team")];
const UNASSIGNPLAYERFROMTEAM_PARAMS: &[ParamSpec] = &[req("name")];
const SHOWALLTEAMS_PARAMS: &[ParamSpec] = &[];
const SHOWSPECIFICTEAMROSTER_PARAMS: &[ParamSpec] = &[req("team")];
const ADDNICKNAME_PARAMS: &[ParamSpec] = &[req("name"), req("nickname")];
const REMOVENICKNAME_PARAMS: &[ParamSpec] = &[req("name"), req("nickname")];
const NICKNAMESFOR_PARAMS: &[ParamSpec] = &[req("name")];
const STATS_PARAMS: &[ParamSpec] = &[opt("player"), opt("lastxwars"), opt("sortby")];
const SCANIMAGE_PARAMS: &[ParamSpec] = &[];
const BULKSCANIMAGE_PARAMS: &[ParamSpec] = &[];
const DEBUGOCR_PARAMS: &[ParamSpec] = &[req("image_url")];

impl Registry {
    /// The full command surface, registered at startup.
    pub fn standard() -> Self {
        let commands = vec![
            CommandSpec {
                name: "setup",
                description: "Register this guild: team name, starting roster, results channel",
                params: SETUP_PARAMS,
                handler: admin::setup,
            },
            CommandSpec {
                name: "setchannel",
                description: "Set the channel watched for result screenshots",
                params: SETCHANNEL_PARAMS,
                handler: admin::setchannel,
            },
            CommandSpec {
                name: "checkpermissions",
                description: "Verify the bot's view of a channel",
                params: CHECKPERMISSIONS_PARAMS,
                handler: admin::checkpermissions,
            },
            CommandSpec {
                name: "addwar",
                description: "Record a war manually (Name:Score,Name:Score)",
                params: ADDWAR_PARAMS,
                handler: war::addwar,
            },
            CommandSpec {
                name: "appendplayertowar",
                description: "Add players to an existing war",
                params: APPENDPLAYERTOWAR_PARAMS,
                handler: war::appendplayertowar,
            },
            CommandSpec {
                name: "removewar",
                description: "Delete a war and revert its statistics",
                params: REMOVEWAR_PARAMS,
                handler: war::removewar,
            },
            CommandSpec {
                name: "showallwars",
                description: "List recent wars",
                params: SHOWALLWARS_PARAMS,
                handler: war::showallwars,
            },
            CommandSpec {
                name: "addplayer",
                description: "Add a player to the roster",
                params: ADDPLAYER_PARAMS,
                handler: roster::addplayer,
            },
            CommandSpec {
                name: "removeplayer",
                description: "Remove a player from the active roster",
                params: REMOVEPLAYER_PARAMS,
                handler: roster::removeplayer,
            },
            CommandSpec {
                name: "setmemberstatus",
                description: "Change a player's member status",
                params: SETMEMBERSTATUS_PARAMS,
                handler: roster::setmemberstatus,
            },
            CommandSpec {
                name: "roster",
                description: "Show the active roster",
                params: ROSTER_PARAMS,
                handler: roster::roster,
            },
            CommandSpec {
                name: "showtrials",
                description: "Show trial members",
                params: SHOWTRIALS_PARAMS,
                handler: roster::showtrials,
            },
            CommandSpec {
                name: "showkicked",
                description: "Show kicked players",
                params: SHOWKICKED_PARAMS,
                handler: roster::showkicked,
            },
            CommandSpec {
                name: "addteam",
                description: "Create a team",
                params: ADDTEAM_PARAMS,
                handler: team::addteam,
            },
            CommandSpec {
                name: "removeteam",
                description: "Delete a team (players become Unassigned)",
                params: REMOVETEAM_PARAMS,
                handler: team::removeteam,
            },
            CommandSpec {
                name: "renameteam",
                description: "Rename a team",
                params: RENAMETEAM_PARAMS,
                handler: team::renameteam,
            },
            CommandSpec {
                name: "assignplayers",
                description: "Assign players (comma-separated) to a team",
                params: ASSIGNPLAYERS_PARAMS,
                handler: team::assignplayers,
            },
            CommandSpec {
                name: "unassignplayerfromteam",
                description: "Move a player back to Unassigned",
                params: UNASSIGNPLAYERFROMTEAM_PARAMS,
                handler: team::unassignplayerfromteam,
            },
            CommandSpec {
                name: "showallteams",
                description: "List teams and their sizes",
                params: SHOWALLTEAMS_PARAMS,
                handler: team::showallteams,
            },
            CommandSpec {
                name: "showspecificteamroster",
                description: "List the players of one team",
                params: SHOWSPECIFICTEAMROSTER_PARAMS,
                handler: team::showspecificteamroster,
            },
            CommandSpec {
                name: "addnickname",
                description: "Attach an OCR alias to a player",
                params: ADDNICKNAME_PARAMS,
                handler: nickname::addnickname,
            },
            CommandSpec {
                name: "removenickname",
                description: "Remove a player's nickname",
                params: REMOVENICKNAME_PARAMS,
                handler: nickname::removenickname,
            },
            CommandSpec {
                name: "nicknamesfor",
                description: "List a player's nicknames",
                params: NICKNAMESFOR_PARAMS,
                handler: nickname::nicknamesfor,
            },
            CommandSpec {
                name: "stats",
                description: "Player statistics or the leaderboard",
                params: STATS_PARAMS,
                handler: stats::stats,
            },
            CommandSpec {
                name: "scanimage",
                description: "Scan the most recent screenshot in this channel",
                params: SCANIMAGE_PARAMS,
                handler: scan::scanimage,
            },
            CommandSpec {
                name: "bulkscanimage",
                description: "Scan recent screenshots into a review session",
                params: BULKSCANIMAGE_PARAMS,
                handler: scan::bulkscanimage,
            },
            CommandSpec {
                name: "debugocr",
                description: "Show raw OCR output for an image URL",
                params: DEBUGOCR_PARAMS,
                handler: scan::debugocr,
            },
        ];

        let index = commands
            .iter()
            .enumerate()
            .map(|(i, spec)| (spec.name, i))
            .collect();
        Self { commands, index }
    }

    pub fn get(&self, name: &str) -> Option<&CommandSpec> {
        self.index.get(name).map(|&i| &self.commands[i])
    }

    pub fn help_text(&self) -> String {
        let mut lines = vec!["Available commands:".to_string()];
        for spec in &self.commands {
            let params: Vec<String> = spec
                .params
                .iter()
                .map(|p| {
                    if p.required {
                        format!("<{}>", p.name)
                    } else {
                        format!("[{}]", p.name)
                    }
                })
                .collect();
            lines.push(format!("/{} {} - {}", spec.name, params.join(" "), spec.description));
        }
        lines.join("\n")
    }

    /// Run one command event to a user-visible reply.
    pub async fn dispatch(
        &self,
        state: &BotState,
        gateway: &dyn ChatGateway,
        event: CommandEvent,
    ) -> String {
        if event.command == "help" {
            return self.help_text();
        }

        let Some(spec) = self.get(&event.command) else {
            return format!("Unknown command '{}'. Try /help.", event.command);
        };

        for param in spec.params {
            if param.required && !event.args.contains_key(param.name) {
                return format!("Missing required argument '{}' for /{}.", param.name, spec.name);
            }
        }

        let call = CommandCall {
            guild_id: event.guild_id,
            channel_id: event.channel_id,
            user_id: event.user_id,
            args: event.args,
        };

        match (spec.handler)(state, gateway, call).await {
            Ok(reply) => reply,
            Err(e) => user_message(spec.name, e),
        }
    }
}

fn user_message(command: &str, e: Error) -> String {
    match e {
        Error::InvalidInput(_)
        | Error::NotFound(_)
        | Error::Duplicate(_)
        | Error::PermissionDenied(_)
        | Error::InvalidState(_)
        | Error::Expired(_)
        | Error::Ocr(_)
        | Error::Timeout(_) => e.to_string(),
        other => {
            error!(command, error = %other, "command failed unexpectedly");
            format!("Something went wrong running /{} - the failure has been logged.", command)
        }
    }
}
