//! Whiteboard wire protocol.
//!
//! Newline-delimited UTF-8 text over a persistent TCP stream, one command or
//! reply per line. A single space is the only token delimiter, so neither
//! usernames nor whiteboard names may contain one.

use std::fmt;
use std::str::FromStr;

use tokio::sync::mpsc;

use crate::error::WhiteboardError;

/// Port the server listens on when nothing else is configured.
pub const DEFAULT_PORT: u16 = 4444;

pub const INVALID_INPUT: &str = "Invalid input.";
pub const USERNAME_TAKEN: &str = "That username is already being used.";
pub const USERNAME_HAS_SPACE: &str = "There should be no spaces in the username.";
pub const USERNAME_ALREADY_SET: &str = "This connection already has a username.";
pub const WHITEBOARD_HAS_SPACE: &str = "Whiteboard names cannot contain any spaces.";
pub const WHITEBOARD_TAKEN: &str =
    "A whiteboard with that name has already created.  Please choose another name.";
pub const WHITEBOARD_MISSING: &str = "A whiteboard with that name has not been created.";

/// Usernames and whiteboard names are non-empty and contain no whitespace.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && !name.chars().any(char::is_whitespace)
}

/// An RGB color as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    /// Canvas background.
    pub const WHITE: Color = Color::new(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.r, self.g, self.b)
    }
}

/// Arguments of a `draw` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawRequest {
    pub whiteboard: String,
    pub x1: usize,
    pub y1: usize,
    pub x2: usize,
    pub y2: usize,
    pub color: Color,
    pub thickness: usize,
}

/// A parsed client request.
///
/// Name arguments that may legitimately span several tokens (`username`,
/// `create`, the whiteboard of `open`) keep the raw remainder of the line so
/// that the handler can answer with the specific naming error instead of a
/// generic `Invalid input.`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Username(String),
    Create(String),
    Open { username: String, whiteboard: String },
    List,
    UsersOnWhiteboard(String),
    Draw(DrawRequest),
    Reset(String),
    Close { username: String, whiteboard: String },
    Logout(String),
}

impl Command {
    /// Verb used in logs.
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Username(_) => "username",
            Self::Create(_) => "create",
            Self::Open { .. } => "open",
            Self::List => "list",
            Self::UsersOnWhiteboard(_) => "getUsersOnWhiteboard",
            Self::Draw(_) => "draw",
            Self::Reset(_) => "reset",
            Self::Close { .. } => "close",
            Self::Logout(_) => "logout",
        }
    }
}

fn non_empty(rest: Option<&str>) -> Result<&str, WhiteboardError> {
    rest.filter(|r| !r.is_empty())
        .ok_or(WhiteboardError::InvalidInput)
}

/// Split into exactly `N` non-empty space-separated tokens.
fn exact_tokens<const N: usize>(rest: Option<&str>) -> Result<[&str; N], WhiteboardError> {
    let tokens: Vec<&str> = non_empty(rest)?.split(' ').collect();
    if tokens.iter().any(|t| t.is_empty()) {
        return Err(WhiteboardError::InvalidInput);
    }
    tokens.try_into().map_err(|_| WhiteboardError::InvalidInput)
}

fn number<T: FromStr>(token: &str) -> Result<T, WhiteboardError> {
    // Reject signs so that "+3" does not sneak through `FromStr`.
    if !token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(WhiteboardError::InvalidInput);
    }
    token.parse().map_err(|_| WhiteboardError::InvalidInput)
}

impl FromStr for Command {
    type Err = WhiteboardError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let (verb, rest) = match line.split_once(' ') {
            Some((verb, rest)) => (verb, Some(rest)),
            None => (line, None),
        };

        match verb {
            "list" if rest.is_none() => Ok(Self::List),
            "username" => Ok(Self::Username(non_empty(rest)?.to_string())),
            "create" => Ok(Self::Create(non_empty(rest)?.to_string())),
            "getUsersOnWhiteboard" => {
                Ok(Self::UsersOnWhiteboard(non_empty(rest)?.to_string()))
            }
            "reset" => Ok(Self::Reset(non_empty(rest)?.to_string())),
            "logout" => {
                let [username] = exact_tokens(rest)?;
                Ok(Self::Logout(username.to_string()))
            }
            "open" => {
                let (username, whiteboard) = non_empty(rest)?
                    .split_once(' ')
                    .ok_or(WhiteboardError::InvalidInput)?;
                if username.is_empty() || whiteboard.is_empty() {
                    return Err(WhiteboardError::InvalidInput);
                }
                Ok(Self::Open {
                    username: username.to_string(),
                    whiteboard: whiteboard.to_string(),
                })
            }
            "close" => {
                let [username, whiteboard] = exact_tokens(rest)?;
                Ok(Self::Close {
                    username: username.to_string(),
                    whiteboard: whiteboard.to_string(),
                })
            }
            "draw" => {
                let [whiteboard, x1, y1, x2, y2, r, g, b, thickness] = exact_tokens(rest)?;
                Ok(Self::Draw(DrawRequest {
                    whiteboard: whiteboard.to_string(),
                    x1: number(x1)?,
                    y1: number(y1)?,
                    x2: number(x2)?,
                    y2: number(y2)?,
                    color: Color::new(number(r)?, number(g)?, number(b)?),
                    thickness: number(thickness)?,
                }))
            }
            _ => Err(WhiteboardError::InvalidInput),
        }
    }
}

/// Lines that travel through the ordered outbound queue. `list` and
/// `getUsersOnWhiteboard` reuse the same lines as their replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    AllUsersOnline(Vec<String>),
    AllWhiteboards(Vec<String>),
    AlsoEditing(Vec<String>),
    DrawLine(String),
    Reset,
    /// Answer to `open`, queued behind every change the snapshot includes.
    Opened { whiteboard: String, snapshot: String },
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllUsersOnline(names) => write!(f, "allUsersOnline {}", names.join(" ")),
            Self::AllWhiteboards(names) => write!(f, "allwhiteboards {}", names.join(" ")),
            Self::AlsoEditing(names) => write!(f, "alsoediting {}", names.join(" ")),
            Self::DrawLine(cells) => write!(f, "drawLine {cells}"),
            Self::Reset => f.write_str("reset"),
            Self::Opened {
                whiteboard,
                snapshot,
            } => write!(f, "open {whiteboard} {snapshot}"),
        }
    }
}

/// Direct answer to the session that sent a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    UsernameCreated(String),
    UsernameError(&'static str),
    WhiteboardCreated(String),
    WhiteboardNameError(&'static str),
    WhiteboardOpenError(&'static str),
    Notify(Notification),
    /// Empty line acknowledging `draw`, `reset` and `close`.
    Ack,
    InvalidInput,
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UsernameCreated(name) => write!(f, "usernameCreated {name}"),
            Self::UsernameError(reason) => write!(f, "usernameerror {reason}"),
            Self::WhiteboardCreated(name) => write!(f, "whiteboardcreated {name}"),
            Self::WhiteboardNameError(reason) => write!(f, "whiteboardnameerror {reason}"),
            Self::WhiteboardOpenError(reason) => write!(f, "whiteboardopenerror {reason}"),
            Self::Notify(notification) => fmt::Display::fmt(notification, f),
            Self::Ack => Ok(()),
            Self::InvalidInput => f.write_str(INVALID_INPUT),
        }
    }
}

impl From<&WhiteboardError> for Reply {
    fn from(err: &WhiteboardError) -> Self {
        match err {
            WhiteboardError::UsernameTaken(_) => Self::UsernameError(USERNAME_TAKEN),
            WhiteboardError::InvalidUsername(_) => Self::UsernameError(USERNAME_HAS_SPACE),
            WhiteboardError::AlreadyRegistered(_) => Self::UsernameError(USERNAME_ALREADY_SET),
            WhiteboardError::NameConflict(_) => Self::WhiteboardNameError(WHITEBOARD_TAKEN),
            WhiteboardError::InvalidName(_) => Self::WhiteboardNameError(WHITEBOARD_HAS_SPACE),
            WhiteboardError::NotFound(_) => Self::WhiteboardOpenError(WHITEBOARD_MISSING),
            _ => Self::InvalidInput,
        }
    }
}

/// Who a notification is delivered to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    /// Every registered session.
    Everyone,
    /// Sessions subscribed to a whiteboard when the notification is delivered.
    Subscribers {
        whiteboard: String,
        except: Option<String>,
    },
    /// One connection, by id, whether or not it has a username yet.
    Connection(String),
}

/// A notification queued for fan-out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub audience: Audience,
    pub notification: Notification,
}

impl Outbound {
    pub fn everyone(notification: Notification) -> Self {
        Self {
            audience: Audience::Everyone,
            notification,
        }
    }

    pub fn subscribers(whiteboard: &str, notification: Notification) -> Self {
        Self {
            audience: Audience::Subscribers {
                whiteboard: whiteboard.to_string(),
                except: None,
            },
            notification,
        }
    }

    pub fn connection(conn_id: &str, notification: Notification) -> Self {
        Self {
            audience: Audience::Connection(conn_id.to_string()),
            notification,
        }
    }

    /// Skip one subscriber, typically the session that caused the change.
    pub fn except(mut self, username: &str) -> Self {
        if let Audience::Subscribers { except, .. } = &mut self.audience {
            *except = Some(username.to_string());
        }
        self
    }
}

/// Ordered queue of notifications.
///
/// Producers enqueue while holding the lock that serialized the change, which
/// fixes delivery order without delivering under the lock.
pub type OutboundSender = mpsc::UnboundedSender<Outbound>;
pub type OutboundReceiver = mpsc::UnboundedReceiver<Outbound>;
