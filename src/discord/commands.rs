use anyhow::Result;
use serenity::all::{
    CommandDataOption, CommandDataOptionValue, CommandInteraction, CommandOptionType, Context,
    CreateCommand, CreateCommandOption, EditInteractionResponse, GuildId, Interaction, Permissions,
};
use tracing::warn;

use crate::AppContext;
use crate::commands::{CommandArgs, handle_subcommand};

pub const COMMAND_NAME: &str = "sentinel";

fn user_sub(name: &str, description: &str) -> CreateCommandOption {
    CreateCommandOption::new(CommandOptionType::SubCommand, name, description).add_sub_option(
        CreateCommandOption::new(CommandOptionType::User, "user", "Użytkownik").required(true),
    )
}

fn list_group(name: &str, label: &str) -> CreateCommandOption {
    CreateCommandOption::new(CommandOptionType::SubCommandGroup, name, format!("Zarządzanie: {label}"))
        .add_sub_option(user_sub("add", "Dodaj wpis"))
        .add_sub_option(user_sub("remove", "Usuń wpis"))
        .add_sub_option(CreateCommandOption::new(
            CommandOptionType::SubCommand,
            "list",
            "Pokaż wpisy",
        ))
}

pub async fn register_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id
        .create_command(
            &ctx.http,
            CreateCommand::new(COMMAND_NAME)
                .description("Tigris Sentinel: zaufani użytkownicy i webhooki")
                .default_member_permissions(Permissions::ADMINISTRATOR)
                .add_option(list_group("whitelist", "whitelista"))
                .add_option(list_group("blacklist", "blacklista"))
                .add_option(
                    CreateCommandOption::new(CommandOptionType::SubCommandGroup, "webhook", "Webhooki na żądanie")
                        .add_sub_option(
                            CreateCommandOption::new(CommandOptionType::SubCommand, "create", "Utwórz webhook (wygasa sam)")
                                .add_sub_option(
                                    CreateCommandOption::new(CommandOptionType::Channel, "channel", "Kanał")
                                        .required(true),
                                )
                                .add_sub_option(CreateCommandOption::new(
                                    CommandOptionType::String,
                                    "name",
                                    "Nazwa webhooka",
                                )),
                        ),
                ),
        )
        .await?;
    Ok(())
}

/// "grupa.podkomenda" + argumenty z drzewa opcji.
pub fn parse_invocation(options: &[CommandDataOption]) -> Option<(String, CommandArgs)> {
    let group = options.first()?;
    let CommandDataOptionValue::SubCommandGroup(subs) = &group.value else {
        return None;
    };
    let sub = subs.first()?;
    let CommandDataOptionValue::SubCommand(params) = &sub.value else {
        return None;
    };

    let mut args = CommandArgs::default();
    for p in params {
        match (p.name.as_str(), &p.value) {
            ("user", CommandDataOptionValue::User(u)) => args.user = Some(u.get()),
            ("channel", CommandDataOptionValue::Channel(c)) => args.channel = Some(c.get()),
            ("name", CommandDataOptionValue::String(s)) => args.name = Some(s.trim().to_string()),
            _ => {}
        }
    }
    Some((format!("{}.{}", group.name, sub.name), args))
}

pub async fn on_interaction(ctx: &Context, app: &AppContext, interaction: Interaction) {
    let Some(cmd) = interaction.command() else {
        return;
    };
    if cmd.data.name != COMMAND_NAME {
        return;
    }
    let Some(guild_id) = cmd.guild_id else {
        return;
    };
    if let Err(e) = cmd.defer_ephemeral(&ctx.http).await {
        warn!(error = ?e, "failed to defer sentinel interaction");
    }

    let content = match parse_invocation(&cmd.data.options) {
        Some((name, args)) => {
            handle_subcommand(&app.sentinel(), guild_id.get(), cmd.user.id.get(), &name, args).await
        }
        None => "❌ Nieznana komenda.".to_string(),
    };
    respond(ctx, &cmd, content).await;
}

async fn respond(ctx: &Context, cmd: &CommandInteraction, content: String) {
    if let Err(e) = cmd
        .edit_response(&ctx.http, EditInteractionResponse::new().content(content))
        .await
    {
        warn!(error = ?e, "failed to edit sentinel response");
    }
}
