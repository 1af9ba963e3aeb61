// Copyright (C) 2026 StarHuntingGames
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use std::sync::Arc;

use anyhow::Context;
use cardgame_common::{launch_url, required_env};
use teloxide::{
    payloads::SendMessageSetters,
    prelude::*,
    types::{InlineKeyboardButton, InlineKeyboardMarkup, ParseMode, User, WebAppInfo},
    utils::command::BotCommands,
};
use tracing::{debug, info, warn};
use url::Url;

const LAUNCH_BUTTON_LABEL: &str = "Играть в карточную игру!";

const HELP_TEXT: &str = "🎮 <b>Карточная игра в Telegram</b> 🎮\n\n\
Команды:\n\
/start - Запустить игру\n\
/help - Показать это сообщение\n\n\
Правила игры:\n\
- Разыгрывайте карты, тратя ману\n\
- Атакуйте карты противника или его героя\n\
- Побеждайте, уменьшив здоровье вражеского героя до 0\n\n\
Удачи в сражениях!";

#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Команды карточной игры:")]
enum Command {
    #[command(description = "запустить игру")]
    Start,
    #[command(description = "показать это сообщение")]
    Help,
}

#[derive(Debug, Clone)]
struct LaunchConfig {
    webapp_url: Url,
}

impl LaunchConfig {
    fn from_env() -> anyhow::Result<Self> {
        let raw = required_env("WEBAPP_URL")?;
        let webapp_url = Url::parse(&raw).context("WEBAPP_URL must be an absolute URL")?;
        Ok(Self { webapp_url })
    }
}

#[derive(Debug, Clone, PartialEq)]
struct LaunchButton {
    label: String,
    url: Url,
}

/// A message ready to be sent, independent of the transport.
#[derive(Debug, Clone, PartialEq)]
struct BotReply {
    text: String,
    parse_mode: Option<ParseMode>,
    launch: Option<LaunchButton>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Caller {
    identity: String,
    display_name: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "launch_bot=debug,teloxide=info".to_string()),
        )
        .init();

    let token = required_env("TELEGRAM_BOT_TOKEN")?;
    let config = Arc::new(LaunchConfig::from_env()?);
    let bot = Bot::new(token);

    if let Err(error) = bot.set_my_commands(Command::bot_commands()).await {
        warn!(error = %error, "failed to register bot commands");
    }

    info!(webapp_url = %config.webapp_url, "launch-bot polling for updates");

    let handler = Update::filter_message()
        .filter_command::<Command>()
        .endpoint(answer);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![config])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

async fn answer(
    bot: Bot,
    msg: Message,
    cmd: Command,
    config: Arc<LaunchConfig>,
) -> ResponseResult<()> {
    let reply = match cmd {
        Command::Start => {
            let Some(caller) = caller_of(msg.from.as_ref()) else {
                warn!(chat_id = msg.chat.id.0, "ignoring /start without a sender");
                return Ok(());
            };
            debug!(identity = %caller.identity, "sending launch button");
            start_reply(&config, &caller)
        }
        Command::Help => help_reply(),
    };

    send_reply(&bot, msg.chat.id, reply).await
}

fn caller_of(sender: Option<&User>) -> Option<Caller> {
    sender.map(|user| Caller {
        identity: user.id.0.to_string(),
        display_name: user.first_name.clone(),
    })
}

fn start_reply(config: &LaunchConfig, caller: &Caller) -> BotReply {
    BotReply {
        text: format!(
            "Приветствую, {}! Готов покорить мир карточных сражений?",
            caller.display_name
        ),
        parse_mode: None,
        launch: Some(LaunchButton {
            label: LAUNCH_BUTTON_LABEL.to_string(),
            url: launch_url(&config.webapp_url, &caller.identity),
        }),
    }
}

fn help_reply() -> BotReply {
    BotReply {
        text: HELP_TEXT.to_string(),
        parse_mode: Some(ParseMode::Html),
        launch: None,
    }
}

async fn send_reply(bot: &Bot, chat_id: ChatId, reply: BotReply) -> ResponseResult<()> {
    let mut request = bot.send_message(chat_id, reply.text);
    if let Some(parse_mode) = reply.parse_mode {
        request = request.parse_mode(parse_mode);
    }
    if let Some(launch) = reply.launch {
        let button = InlineKeyboardButton::web_app(launch.label, WebAppInfo { url: launch.url });
        request = request.reply_markup(InlineKeyboardMarkup::new([[button]]));
    }
    request.await?;
    Ok(())
}
