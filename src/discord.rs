use crate::commands::{self, Command};
use crate::error::HistoryError;
use crate::leveling::Leveling;
use crate::message::{
    Author, HistoryMessage, HistorySource, IncomingMessage, Place, ReferencedMessage, Reply, Tone,
};
use crate::orchestrator::Orchestrator;
use crate::trigger::{self, Trigger};
use serenity::all::{
    ChannelId, Colour, Context, CreateEmbed, CreateEmbedFooter, CreateMessage, EventHandler,
    GetMessages, Http, Message, MessageId, Ready, UserId,
};
use serenity::async_trait;
use std::sync::Arc;
use tracing::{error, info};

pub struct Handler {
    orchestrator: Arc<Orchestrator>,
    leveling: Arc<Leveling>,
}

impl Handler {
    pub fn new(orchestrator: Arc<Orchestrator>, leveling: Arc<Leveling>) -> Self {
        Self {
            orchestrator,
            leveling,
        }
    }

    async fn run_command(&self, ctx: &Context, msg: &Message, command: Command) -> Reply {
        let author = author_of(msg);
        match command {
            Command::Remember(statement) => {
                let _ = msg.channel_id.broadcast_typing(&ctx.http).await;
                self.orchestrator.remember(&author, &statement).await
            }
            Command::ListFacts => self.orchestrator.list_facts(&author).await,
            Command::Forget(selector) => self.orchestrator.forget(&author, &selector).await,
            Command::SetupPersona => self.orchestrator.setup_persona(is_admin(ctx, msg)).await,
            Command::Level => self.leveling.stats(&author).await,
            Command::Leaderboard(track) => {
                let guild_id = msg.guild_id;
                let name_of = |user_id: u64| {
                    let guild = ctx.cache.guild(guild_id?)?;
                    guild
                        .members
                        .get(&UserId::new(user_id))
                        .map(|member| member.display_name().to_string())
                };
                self.leveling.leaderboard(track, &author, name_of).await
            }
            Command::AddXp(grant) => self.leveling.add_xp(grant, is_admin(ctx, msg)).await,
            Command::Malformed(usage) => Reply::text(usage),
        }
    }

    async fn award_xp(&self, ctx: &Context, msg: &Message) {
        if msg.guild_id.is_none() {
            return;
        }

        match self.leveling.award(msg.author.id.get(), &roles_of(msg)).await {
            Ok(level_ups) => {
                for level_up in level_ups {
                    let text = level_up.congratulation(msg.author.id.get());
                    if let Err(e) = msg.channel_id.say(&ctx.http, text).await {
                        error!("Failed to announce level up: {}", e);
                    }
                }
            }
            Err(e) => error!("Failed to award XP: {}", e),
        }
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("{} has connected to Discord", ready.user.name);
        info!("Bot is in {} guild(s)", ready.guilds.len());
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }

        if let Some(command) = commands::parse(&msg.content) {
            let reply = self.run_command(&ctx, &msg, command).await;
            deliver(&ctx, &msg, reply).await;
            return;
        }

        let assistant_id = ctx.cache.current_user().id;
        let replies_to_assistant = msg
            .referenced_message
            .as_ref()
            .is_some_and(|referenced| referenced.author.id == assistant_id);

        match trigger::detect(&msg.content, assistant_id.get(), replies_to_assistant) {
            Trigger::Prompt(prompt) => {
                let _ = msg.channel_id.broadcast_typing(&ctx.http).await;
                let incoming = incoming_message(&ctx, &msg, assistant_id).await;
                let reply = self.orchestrator.respond(&incoming, &prompt).await;
                deliver(&ctx, &msg, reply).await;
            }
            Trigger::Silent => {}
            Trigger::NotAddressed => self.award_xp(&ctx, &msg).await,
        }
    }
}

fn is_admin(ctx: &Context, msg: &Message) -> bool {
    msg.author_permissions(&ctx.cache)
        .is_some_and(|permissions| permissions.administrator())
}

fn display_name(msg: &Message) -> String {
    msg.member
        .as_ref()
        .and_then(|member| member.nick.clone())
        .unwrap_or_else(|| msg.author.display_name().to_string())
}

fn author_of(msg: &Message) -> Author {
    Author {
        id: msg.author.id.get(),
        display_name: display_name(msg),
        is_bot: msg.author.bot,
    }
}

fn roles_of(msg: &Message) -> Vec<u64> {
    msg.member
        .as_ref()
        .map(|member| member.roles.iter().map(|role| role.get()).collect())
        .unwrap_or_default()
}

async fn incoming_message(ctx: &Context, msg: &Message, assistant_id: UserId) -> IncomingMessage {
    let channel_name = match msg.channel(ctx).await {
        Ok(channel) => channel
            .guild()
            .map(|channel| channel.name)
            .unwrap_or_else(|| "direct-message".to_string()),
        Err(e) => {
            error!("Failed to resolve channel {}: {}", msg.channel_id, e);
            "unknown".to_string()
        }
    };

    let server = msg.guild_id.map(|guild_id| Place {
        id: guild_id.get(),
        name: guild_id
            .name(&ctx.cache)
            .unwrap_or_else(|| "Unknown Server".to_string()),
    });

    let reply_to = msg.referenced_message.as_deref().map(|referenced| ReferencedMessage {
        author: Author {
            id: referenced.author.id.get(),
            display_name: referenced.author.display_name().to_string(),
            is_bot: referenced.author.bot,
        },
        content: referenced.content.clone(),
        from_assistant: referenced.author.id == assistant_id,
    });

    IncomingMessage {
        id: msg.id.get(),
        author: author_of(msg),
        content: msg.content.clone(),
        reply_to,
        channel: Place {
            id: msg.channel_id.get(),
            name: channel_name,
        },
        server,
        roles: roles_of(msg),
    }
}

fn colour(tone: Tone) -> Colour {
    match tone {
        Tone::Success => Colour::from_rgb(46, 204, 113),
        Tone::Info => Colour::BLUE,
        Tone::Danger => Colour::RED,
        Tone::Translation => Colour::DARK_GREEN,
        Tone::Ranking => Colour::GOLD,
    }
}

/// Sends `reply` as a reply to `msg`. Long text is not split here.
async fn deliver(ctx: &Context, msg: &Message, reply: Reply) {
    let builder = match reply {
        Reply::Text(text) => CreateMessage::new().content(text),
        Reply::Titled {
            title,
            body,
            footer,
            tone,
        } => {
            let mut embed = CreateEmbed::new()
                .title(title)
                .description(body)
                .colour(colour(tone));
            if let Some(footer) = footer {
                embed = embed.footer(CreateEmbedFooter::new(footer));
            }
            CreateMessage::new().embed(embed)
        }
    };

    if let Err(e) = msg
        .channel_id
        .send_message(&ctx.http, builder.reference_message(msg))
        .await
    {
        error!("Failed to deliver reply: {}", e);
    }
}

/// Channel history over the Discord REST API.
pub struct ChannelHistory {
    http: Arc<Http>,
}

impl ChannelHistory {
    pub fn new(token: &str) -> Self {
        Self {
            http: Arc::new(Http::new(token)),
        }
    }
}

#[async_trait]
impl HistorySource for ChannelHistory {
    async fn messages_before(
        &self,
        channel_id: u64,
        before: u64,
        limit: u8,
    ) -> Result<Vec<HistoryMessage>, HistoryError> {
        let builder = GetMessages::new().before(MessageId::new(before)).limit(limit);
        let messages = ChannelId::new(channel_id)
            .messages(&self.http, builder)
            .await
            .map_err(|e| HistoryError::Fetch(e.to_string()))?;

        Ok(messages
            .into_iter()
            .map(|m| HistoryMessage {
                id: m.id.get(),
                author: Author {
                    id: m.author.id.get(),
                    display_name: m
                        .member
                        .as_ref()
                        .and_then(|member| member.nick.clone())
                        .unwrap_or_else(|| m.author.display_name().to_string()),
                    is_bot: m.author.bot,
                },
                content: m.content,
            })
            .collect())
    }
}
