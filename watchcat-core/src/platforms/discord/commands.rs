// File: watchcat-core/src/platforms/discord/commands.rs
//
// Text commands, invoked as `@bot <command> [args...]`.

use std::collections::BTreeSet;

use crate::services::command_service::{CardLookup, CommandService};
use crate::Error;

pub const PROJECT_URL: &str = "https://github.com/fisuku/watchcat";

/// Discord rejects longer message contents.
const MAX_REPLY_LEN: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Privilege {
    User,
    Admin,
    Owner,
}

impl Privilege {
    pub fn label(self) -> &'static str {
        match self {
            Privilege::Owner => "OWNER",
            Privilege::Admin => "ADMIN",
            Privilege::User => "USER",
        }
    }
}

pub struct CommandSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub privilege: Privilege,
    pub hidden: bool,
}

const fn cmd(name: &'static str, description: &'static str, privilege: Privilege, hidden: bool) -> CommandSpec {
    CommandSpec { name, description, privilege, hidden }
}

pub const COMMANDS: &[CommandSpec] = &[
    cmd("help", "View this help page.", Privilege::User, false),
    cmd("about", "Information about this bot, and the invite link.", Privilege::User, false),
    cmd("status", "View the watchlist, and who is online. Usage: status <service>", Privilege::User, false),
    cmd("watch", "Add one or more user(s) to the watchlist.", Privilege::Admin, false),
    cmd("unwatch", "Remove one or more user(s) from the watchlist.", Privilege::Admin, false),
    cmd("use", "Designates the specified channel (or this one) for stream updates.", Privilege::Admin, false),
    cmd("grant", "Grant admin privileges to a given role.", Privilege::Owner, false),
    cmd("revoke", "Revoke admin privileges from a given role.", Privilege::Owner, false),
    cmd("admins", "Display all roles with admin privileges.", Privilege::Owner, false),
    cmd("ping", "Set a role to ping when posting a stream. Send nothing to disable pinging.", Privilege::Owner, false),
    cmd("purge", "(Debug) Manual purge of notifications for this server.", Privilege::Owner, true),
    cmd("match", "(Debug) Test matching for a given stream URL.", Privilege::User, true),
    cmd("card", "(Debug) Render a stream title card.", Privilege::User, true),
    cmd("handlers", "(Debug) Get a list of loaded handlers.", Privilege::User, true),
];

pub fn find_command(name: &str) -> Option<&'static CommandSpec> {
    COMMANDS.iter().find(|c| c.name == name)
}

/// Guild owners and holders of an ADMINISTRATOR role are owners; members
/// with a granted admin role are admins.
pub fn resolve_privilege(
    is_owner_or_administrator: bool,
    member_roles: &[String],
    admin_roles: &BTreeSet<String>,
) -> Privilege {
    if is_owner_or_administrator {
        Privilege::Owner
    } else if member_roles.iter().any(|r| admin_roles.contains(r)) {
        Privilege::Admin
    } else {
        Privilege::User
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub command: String,
    pub args: Vec<String>,
}

/// Parses `<@bot> command args...`. Returns `None` unless the message
/// starts with a mention of `bot_id`. A bare mention asks for help.
pub fn parse_invocation(content: &str, bot_id: &str) -> Option<Invocation> {
    let mut tokens = content.split_whitespace();
    let mention = tokens.next()?;
    if mention != format!("<@{bot_id}>") && mention != format!("<@!{bot_id}>") {
        return None;
    }

    let command = tokens.next().unwrap_or("help").to_lowercase();
    Some(Invocation {
        command,
        args: tokens.map(str::to_string).collect(),
    })
}

/// Strips `<@&id>` / `<#id>` mention syntax, leaving the id.
pub fn strip_mention(arg: &str) -> &str {
    let arg = arg.trim();
    arg.strip_prefix("<@&")
        .or_else(|| arg.strip_prefix("<#"))
        .and_then(|s| s.strip_suffix('>'))
        .unwrap_or(arg)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleInfo {
    pub id: String,
    pub name: String,
}

/// Who invoked a command, and where.
pub struct CommandContext {
    pub guild_id: String,
    pub channel_id: String,
    pub privilege: Privilege,
    /// Roles of the guild, for resolving role arguments.
    pub roles: Vec<RoleInfo>,
    pub application_id: Option<String>,
}

impl CommandContext {
    fn role(&self, arg: &str) -> Option<&RoleInfo> {
        let id = strip_mention(arg);
        self.roles.iter().find(|r| r.id == id)
    }

    fn role_label(&self, id: &str) -> String {
        match self.roles.iter().find(|r| r.id == id) {
            Some(role) => format!("**{}** ({})", role.name, role.id),
            None => format!("(deleted role {id})"),
        }
    }
}

pub fn help_text() -> String {
    let mut out = String::from(
        "**Watchcat**\nDiscord stream push notification service. OWNER commands require a user to have the Administrator permission.\n",
    );
    for privilege in [Privilege::Owner, Privilege::Admin, Privilege::User] {
        out.push_str(&format!("\n__{}__\n", privilege.label()));
        for command in COMMANDS.iter().filter(|c| !c.hidden && c.privilege == privilege) {
            out.push_str(&format!("**{}** {}\n", command.name, command.description));
        }
    }
    out
}

fn about_text(application_id: Option<&str>) -> String {
    let mut out = format!(
        "**Watchcat - stream notification service**\nThis bot supplies a push notification service for Discord. <{PROJECT_URL}>"
    );
    if let Some(id) = application_id {
        out.push_str(&format!(
            "\nInvite URL: <https://discord.com/api/oauth2/authorize?client_id={id}&permissions=2048&scope=bot>"
        ));
    }
    out
}

fn truncate(mut reply: String) -> String {
    if reply.len() > MAX_REPLY_LEN {
        let mut cut = MAX_REPLY_LEN - 1;
        while !reply.is_char_boundary(cut) {
            cut -= 1;
        }
        reply.truncate(cut);
        reply.push('…');
    }
    reply
}

/// Runs one invocation and returns the reply text.
///
/// Unknown commands get the help page; commands above the caller's
/// privilege get a refusal.
pub async fn execute(
    service: &CommandService,
    ctx: &CommandContext,
    invocation: &Invocation,
) -> Result<String, Error> {
    let Some(spec) = find_command(&invocation.command) else {
        return Ok(help_text());
    };
    if ctx.privilege < spec.privilege {
        return Ok("**Insufficient privileges**\nYou do not have the rights to use this command.".to_string());
    }

    let guild = ctx.guild_id.as_str();
    let args = &invocation.args;

    let reply = match spec.name {
        "help" => help_text(),
        "about" => about_text(ctx.application_id.as_deref()),
        "watch" => {
            let report = service.watch(guild, args).await?;
            if report.nothing_matched() {
                "**Usage**: watch piczel.tv/watch/user1 picarto.tv/user2 ...".to_string()
            } else {
                let mut out = format!("{} user(s) added to watchlist.", report.changed);
                if report.unchanged > 0 {
                    out.push_str(&format!(" {} user(s) were already present.", report.unchanged));
                }
                out
            }
        }
        "unwatch" => {
            let report = service.unwatch(guild, args).await?;
            if report.nothing_matched() {
                "**Usage**: unwatch piczel.tv/watch/user1 picarto.tv/user2 ...".to_string()
            } else {
                let mut out = format!("{} user(s) removed from watchlist.", report.changed);
                if report.unchanged > 0 {
                    out.push_str(&format!(" {} user(s) were not present.", report.unchanged));
                }
                out
            }
        }
        "use" => {
            let target = args.first().map(|a| strip_mention(a)).unwrap_or(ctx.channel_id.as_str());
            match service.use_channel(guild, target).await {
                Ok(change) => format!("<#{}> is now set to receive notifications.", change.channel.channel_id),
                Err(e) if e.is_not_found() || matches!(e, Error::Parse(_)) => {
                    format!("Could not find channelID {target}.")
                }
                Err(e) => return Err(e),
            }
        }
        "grant" => match args.first().and_then(|a| ctx.role(a)) {
            Some(role) => {
                service.grant(guild, &role.id).await?;
                format!("Granted admin privileges for role **{}**.", role.name)
            }
            None => "Could not find a role matching this ID. Try copying the ID by right-clicking on the role.".to_string(),
        },
        "revoke" => {
            // Deleted roles can still be revoked, so the id is not resolved.
            let Some(role_id) = args.first().map(|a| strip_mention(a)) else {
                return Ok("**Usage**: revoke <role id>".to_string());
            };
            if service.revoke(guild, role_id).await? {
                "Revoked admin privileges for this role.".to_string()
            } else {
                format!("Cannot seem to find a role with this ID ({role_id}). Was it already removed?")
            }
        }
        "admins" => {
            let roles = service.admins(guild).await?;
            if roles.is_empty() {
                "No roles have been granted admin privileges.".to_string()
            } else {
                let lines: Vec<String> = roles.iter().map(|id| ctx.role_label(id)).collect();
                format!(
                    "**Admins**\nThe following roles are able to use Watchcat admin features on this server.\n{}",
                    lines.join("\n")
                )
            }
        }
        "ping" => match args.first() {
            None => {
                service.unset_ping_role(guild).await?;
                "Pinging disabled.".to_string()
            }
            Some(arg) => match ctx.role(arg) {
                Some(role) => {
                    service.set_ping_role(guild, &role.id).await?;
                    format!("Set ping role to **{}**.", role.name)
                }
                None => "Could not find a role matching this ID. Try copying the ID by right-clicking on the role.".to_string(),
            },
        },
        "status" => status_text(service, guild, args.first().map(String::as_str)).await?,
        "purge" => {
            let purged = service.purge(guild).await?;
            format!("OK ({purged} purged)")
        }
        "match" => match args.first().and_then(|url| service.match_url(url)) {
            Some((name, streamer)) => format!("Found matching handler {name} - {streamer}"),
            None => format!(
                "Can't find matching handler for {}",
                args.first().map(String::as_str).unwrap_or_default()
            ),
        },
        "card" => match args.first().map(|url| service.card(url)) {
            Some(CardLookup::Card(card)) => format!(
                "**{}** <{}>\n{}\n{}",
                card.title, card.url, card.author, card.footer
            ),
            Some(CardLookup::Offline) => "Can't find this user online".to_string(),
            Some(CardLookup::Unmatched) | None => "Can't find a matching handler".to_string(),
        },
        "handlers" => {
            let lines: Vec<String> = service
                .handlers()
                .into_iter()
                .map(|(name, id)| format!("{name} ({id})"))
                .collect();
            format!("**Loaded Handlers**\n{}", lines.join("\n"))
        }
        _ => help_text(),
    };

    Ok(truncate(reply))
}

async fn status_text(service: &CommandService, guild: &str, network: Option<&str>) -> Result<String, Error> {
    let Some(network) = network else {
        let ids: Vec<String> = service.handlers().into_iter().map(|(_, id)| id).collect();
        return Ok(format!("**Usage**: status <{}>", ids.join("|")));
    };

    let report = match service.status(guild, network).await {
        Ok(report) => report,
        Err(e) if e.is_not_found() => return Ok(format!("Unknown service {network}.")),
        Err(e) => return Err(e),
    };

    let target = report
        .channel_id
        .as_deref()
        .map(|c| format!("<#{c}>"))
        .unwrap_or_else(|| "no channel (use the **use** command)".to_string());
    let ping = report
        .ping_role_id
        .as_deref()
        .map(|r| format!(" Role <@&{r}> will be pinged."))
        .unwrap_or_default();

    if !report.is_watching_anyone() {
        return Ok(format!(
            "**No streams followed**\nYou have not yet configured the bot to post any streams. Stream updates will be posted to {target}.{ping}"
        ));
    }

    let mut out = format!(
        "**Watchcat Status - {}**\nPosting stream updates to {target}.{ping}",
        report.network_name
    );
    for (label, users) in [("Online", &report.online), ("Offline", &report.offline)] {
        if users.is_empty() {
            continue;
        }
        out.push_str(&format!("\n\n__{label} ({})__", users.len()));
        for user in users {
            out.push_str(&format!("\n**{}** <{}>", user.username, user.url));
        }
    }
    Ok(out)
}
