//! Command parsing
//!
//! Arguments are positional and whitespace separated. Optional prices can be
//! skipped with `-`, e.g. `/forder b btc 20 10 - 70000` sets only a take profit.

use crate::error::{BotError, Result};
use crate::executor::orders::Side;
use crate::telegram::api::CommandInfo;
use rust_decimal::Decimal;
use std::str::FromStr;

/// Command names and descriptions, registered with the Bot API and listed by `/help`
pub const COMMANDS: &[(&str, &str)] = &[
    ("help", "Get all commands"),
    ("start", "Get public IP of the server"),
    ("info", "Get current trade, balance and pnl"),
    ("forder", "Futures market order 'forder buy/sell coin leverage margin sl(opt) tp(opt)'"),
    ("fclose", "Close all positions and open orders 'fclose coin'"),
    ("fch", "Get chart 'fch coin interval(opt, df=15m) range(opt, df=21 * interval)'"),
    ("fp", "Get prices 'fp coin1 coin2 ...'"),
    ("fstats", "Schedule stats for current positions 'fstats interval(seconds)'"),
    ("flimit", "Futures limit order 'flimit buy/sell coin leverage margin price'"),
    ("ftpsl", "Set tp/sl of a position 'ftpsl coin sl(opt) tp(opt)'"),
    ("falert", "Set alert price 'falert op:coin:price1,price2,...(:gap, df=0.5%) ...'"),
    ("falert_track", "Track all alert prices 'falert_track interval(seconds)'"),
    ("falert_list", "List all current alerts"),
    ("falert_remove", "Remove alerts 'falert_remove all | coin:all|index0,index1 ...'"),
    ("freplies", "Track replies of a thread 'freplies url message_id'"),
    ("freplies_track", "Track all replies 'freplies_track interval(seconds)'"),
    ("freplies_list", "List all tracked replies"),
    ("freplies_remove", "Remove tracked replies 'freplies_remove all | message_id ...'"),
];

pub fn command_infos() -> Vec<CommandInfo> {
    COMMANDS
        .iter()
        .map(|(command, description)| CommandInfo {
            command: command.to_string(),
            description: description.to_string(),
        })
        .collect()
}

/// Usage line shown when arguments are missing or invalid
fn usage(name: &str) -> &'static str {
    match name {
        "forder" => "/forder buy/sell coin leverage margin [sl|-] [tp]",
        "flimit" => "/flimit buy/sell coin leverage margin price",
        "fclose" => "/fclose coin",
        "fch" => "/fch coin [interval] [range]",
        "fp" => "/fp coin1 coin2 ...",
        "fstats" => "/fstats seconds",
        "ftpsl" => "/ftpsl coin [sl|-] [tp]",
        "falert" => "/falert op:coin:price1,price2[:gap] ...",
        "falert_track" => "/falert_track seconds",
        "falert_remove" => "/falert_remove all | coin:all|i,j ...",
        "freplies" => "/freplies url message_id",
        "freplies_track" => "/freplies_track seconds",
        "freplies_remove" => "/freplies_remove all | message_id ...",
        _ => "/help",
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BotCommand {
    Help,
    Start,
    Info,
    Order {
        side: Side,
        coin: String,
        leverage: u32,
        margin: Decimal,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    },
    Close {
        coin: String,
    },
    Chart {
        coin: String,
        interval: Option<String>,
        range: Option<String>,
    },
    Prices {
        coins: Vec<String>,
    },
    Stats {
        interval_secs: u64,
    },
    Limit {
        side: Side,
        coin: String,
        leverage: u32,
        margin: Decimal,
        price: Decimal,
    },
    TpSl {
        coin: String,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    },
    Alert {
        specs: Vec<String>,
    },
    AlertTrack {
        interval_secs: u64,
    },
    AlertList,
    AlertRemove {
        all: bool,
        specs: Vec<String>,
    },
    Replies {
        url: String,
        message_id: i64,
    },
    RepliesTrack {
        interval_secs: u64,
    },
    RepliesList,
    RepliesRemove {
        all: bool,
        message_ids: Vec<i64>,
    },
}

struct Args<'a> {
    name: &'a str,
    items: Vec<&'a str>,
}

impl<'a> Args<'a> {
    fn invalid(&self, detail: impl std::fmt::Display) -> BotError {
        BotError::InvalidCommand(format!("{}\nUsage: {}", detail, usage(self.name)))
    }

    fn get(&self, i: usize) -> Result<&'a str> {
        self.items
            .get(i)
            .copied()
            .ok_or_else(|| self.invalid("Missing argument"))
    }

    fn parse<T: FromStr>(&self, i: usize) -> Result<T> {
        let raw = self.get(i)?;
        raw.parse()
            .map_err(|_| self.invalid(format!("Invalid argument {}", raw)))
    }

    fn positive(&self, i: usize) -> Result<Decimal> {
        let value: Decimal = self.parse(i)?;
        if value <= Decimal::ZERO {
            return Err(self.invalid(format!("{} must be positive", value)));
        }
        Ok(value)
    }

    /// Missing or `-` is `None`
    fn optional_price(&self, i: usize) -> Result<Option<Decimal>> {
        match self.items.get(i) {
            None | Some(&"-") => Ok(None),
            Some(_) => self.positive(i).map(Some),
        }
    }

    fn optional(&self, i: usize) -> Option<String> {
        self.items.get(i).map(|s| s.to_string())
    }

    fn seconds(&self) -> Result<u64> {
        let secs: u64 = self.parse(0)?;
        if secs == 0 {
            return Err(self.invalid("Interval must be at least 1 second"));
        }
        Ok(secs)
    }

    fn leverage(&self, i: usize) -> Result<u32> {
        let leverage: u32 = self.parse(i)?;
        if leverage == 0 {
            return Err(self.invalid("Leverage must be at least 1"));
        }
        Ok(leverage)
    }

    fn rest(&self) -> Result<Vec<String>> {
        if self.items.is_empty() {
            return Err(self.invalid("Missing argument"));
        }
        Ok(self.items.iter().map(|s| s.to_string()).collect())
    }

    fn is_all(&self) -> bool {
        self.items.len() == 1 && self.items[0].eq_ignore_ascii_case("all")
    }
}

impl BotCommand {
    /// `Ok(None)` for text that is not a command
    pub fn parse(text: &str) -> Result<Option<Self>> {
        let mut tokens = text.split_whitespace();
        let Some(head) = tokens.next().and_then(|t| t.strip_prefix('/')) else {
            return Ok(None);
        };
        let name = head.split('@').next().unwrap_or(head).to_lowercase();
        let args = Args {
            name: name.as_str(),
            items: tokens.collect(),
        };

        let cmd = match args.name {
            "help" => BotCommand::Help,
            "start" => BotCommand::Start,
            "info" => BotCommand::Info,
            "forder" => BotCommand::Order {
                side: Side::from_arg(args.get(0)?),
                coin: args.get(1)?.to_uppercase(),
                leverage: args.leverage(2)?,
                margin: args.positive(3)?,
                stop_loss: args.optional_price(4)?,
                take_profit: args.optional_price(5)?,
            },
            "fclose" => BotCommand::Close {
                coin: args.get(0)?.to_uppercase(),
            },
            "fch" => BotCommand::Chart {
                coin: args.get(0)?.to_uppercase(),
                interval: args.optional(1),
                range: args.optional(2),
            },
            "fp" => BotCommand::Prices {
                coins: args.rest()?.iter().map(|c| c.to_uppercase()).collect(),
            },
            "fstats" => BotCommand::Stats {
                interval_secs: args.seconds()?,
            },
            "flimit" => BotCommand::Limit {
                side: Side::from_arg(args.get(0)?),
                coin: args.get(1)?.to_uppercase(),
                leverage: args.leverage(2)?,
                margin: args.positive(3)?,
                price: args.positive(4)?,
            },
            "ftpsl" => BotCommand::TpSl {
                coin: args.get(0)?.to_uppercase(),
                stop_loss: args.optional_price(1)?,
                take_profit: args.optional_price(2)?,
            },
            "falert" => BotCommand::Alert { specs: args.rest()? },
            "falert_track" => BotCommand::AlertTrack {
                interval_secs: args.seconds()?,
            },
            "falert_list" => BotCommand::AlertList,
            "falert_remove" => BotCommand::AlertRemove {
                all: args.is_all(),
                specs: if args.is_all() { Vec::new() } else { args.rest()? },
            },
            "freplies" => BotCommand::Replies {
                url: args.get(0)?.to_string(),
                message_id: args.parse(1)?,
            },
            "freplies_track" => BotCommand::RepliesTrack {
                interval_secs: args.seconds()?,
            },
            "freplies_list" => BotCommand::RepliesList,
            "freplies_remove" => BotCommand::RepliesRemove {
                all: args.is_all(),
                message_ids: if args.is_all() {
                    Vec::new()
                } else {
                    (0..args.rest()?.len())
                        .map(|i| args.parse(i))
                        .collect::<Result<Vec<i64>>>()?
                },
            },
            other => {
                return Err(BotError::InvalidCommand(format!(
                    "Unknown command /{}, see /help",
                    other
                )))
            }
        };
        Ok(Some(cmd))
    }

    /// Command name without the slash, used in logs and error titles
    pub fn name(&self) -> &'static str {
        match self {
            BotCommand::Help => "help",
            BotCommand::Start => "start",
            BotCommand::Info => "info",
            BotCommand::Order { .. } => "forder",
            BotCommand::Close { .. } => "fclose",
            BotCommand::Chart { .. } => "fch",
            BotCommand::Prices { .. } => "fp",
            BotCommand::Stats { .. } => "fstats",
            BotCommand::Limit { .. } => "flimit",
            BotCommand::TpSl { .. } => "ftpsl",
            BotCommand::Alert { .. } => "falert",
            BotCommand::AlertTrack { .. } => "falert_track",
            BotCommand::AlertList => "falert_list",
            BotCommand::AlertRemove { .. } => "falert_remove",
            BotCommand::Replies { .. } => "freplies",
            BotCommand::RepliesTrack { .. } => "freplies_track",
            BotCommand::RepliesList => "freplies_list",
            BotCommand::RepliesRemove { .. } => "freplies_remove",
        }
    }
}
