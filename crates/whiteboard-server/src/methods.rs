//! Command handlers.

use tracing::{debug, info, warn};

use whiteboard_core::error::{Result, WhiteboardError};
use whiteboard_core::protocol::{Command, DrawRequest, Notification, Reply};

use crate::session::{Session, SessionState};
use crate::state::ServerState;

/// What the connection should do after a line has been handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Write this line back to the client.
    Reply(Reply),
    /// Nothing to write directly; any answer was queued.
    Ignore,
    /// The client logged out; close the connection without replying.
    Logout,
}

/// Handle one line from a client.
///
/// Errors never escape: each one maps to its reply line and leaves every
/// piece of shared state untouched.
pub fn dispatch(state: &ServerState, session: &mut Session, line: &str) -> Dispatch {
    if line.is_empty() {
        return Dispatch::Ignore;
    }

    let command = match line.parse::<Command>() {
        Ok(command) => command,
        Err(_) => {
            debug!(conn_id = %session.conn_id(), line, "Invalid input");
            return Dispatch::Reply(Reply::InvalidInput);
        }
    };
    debug!(conn_id = %session.conn_id(), command = command.verb(), "Dispatching command");

    let result = match command {
        Command::Username(username) => {
            handle_username(state, session, &username).map(Dispatch::Reply)
        }
        Command::Create(name) => handle_create(state, &name).map(Dispatch::Reply),
        Command::Open {
            username,
            whiteboard,
        } => handle_open(state, session, &username, &whiteboard).map(|()| Dispatch::Ignore),
        Command::List => Ok(Dispatch::Reply(Reply::Notify(Notification::AllWhiteboards(
            state.registry.list_names(),
        )))),
        Command::UsersOnWhiteboard(name) => {
            handle_users_on_whiteboard(state, &name).map(Dispatch::Reply)
        }
        Command::Draw(request) => handle_draw(state, &request).map(Dispatch::Reply),
        Command::Reset(name) => handle_reset(state, &name).map(Dispatch::Reply),
        Command::Close {
            username,
            whiteboard,
        } => handle_close(state, session, &username, &whiteboard).map(Dispatch::Reply),
        Command::Logout(username) => {
            if session.username() != Some(username.as_str()) {
                warn!(
                    conn_id = %session.conn_id(),
                    requested = %username,
                    "Logout names another user, closing this session only"
                );
            }
            return Dispatch::Logout;
        }
    };

    match result {
        Ok(dispatch) => dispatch,
        Err(e) => {
            debug!(conn_id = %session.conn_id(), error = %e, "Command rejected");
            Dispatch::Reply(Reply::from(&e))
        }
    }
}

fn handle_username(state: &ServerState, session: &mut Session, username: &str) -> Result<Reply> {
    if let Some(current) = session.username() {
        return Err(WhiteboardError::AlreadyRegistered(current.to_string()));
    }
    state.directory.register(username, session.writer.clone())?;
    session.state = SessionState::Authenticated {
        username: username.to_string(),
    };
    Ok(Reply::UsernameCreated(username.to_string()))
}

fn handle_create(state: &ServerState, name: &str) -> Result<Reply> {
    let (width, height) = state.canvas_size();
    state.registry.create(name, width, height)?;
    Ok(Reply::WhiteboardCreated(name.to_string()))
}

/// The `open` answer goes out through the canvas's queue so that it lands
/// between the changes its snapshot includes and the ones it does not.
fn handle_open(
    state: &ServerState,
    session: &mut Session,
    username: &str,
    whiteboard: &str,
) -> Result<()> {
    let canvas = state
        .registry
        .find(whiteboard)
        .ok_or_else(|| WhiteboardError::NotFound(whiteboard.to_string()))?;

    if let Some(current) = session.viewing().filter(|c| *c != whiteboard) {
        debug!(conn_id = %session.conn_id(), current, "Opening a second whiteboard");
    }

    canvas.subscribe(username, session.conn_id());
    session.start_viewing(whiteboard);
    info!(username = %username, canvas = %whiteboard, "Whiteboard opened");
    Ok(())
}

fn handle_users_on_whiteboard(state: &ServerState, whiteboard: &str) -> Result<Reply> {
    let canvas = state
        .registry
        .find(whiteboard)
        .ok_or_else(|| WhiteboardError::NotFound(whiteboard.to_string()))?;
    Ok(Reply::Notify(Notification::AlsoEditing(canvas.subscribers())))
}

fn handle_draw(state: &ServerState, request: &DrawRequest) -> Result<Reply> {
    let canvas = state
        .registry
        .find(&request.whiteboard)
        .ok_or_else(|| WhiteboardError::NotFound(request.whiteboard.clone()))?;

    if !canvas.contains(request.x1, request.y1) || !canvas.contains(request.x2, request.y2) {
        return Err(WhiteboardError::InvalidInput);
    }

    canvas.add_line(
        request.color,
        (request.x1, request.y1),
        (request.x2, request.y2),
        request.thickness,
    );
    Ok(Reply::Ack)
}

fn handle_reset(state: &ServerState, whiteboard: &str) -> Result<Reply> {
    let canvas = state
        .registry
        .find(whiteboard)
        .ok_or_else(|| WhiteboardError::NotFound(whiteboard.to_string()))?;
    canvas.clear();
    info!(canvas = %whiteboard, "Whiteboard reset");
    Ok(Reply::Ack)
}

fn handle_close(
    state: &ServerState,
    session: &mut Session,
    username: &str,
    whiteboard: &str,
) -> Result<Reply> {
    let canvas = state
        .registry
        .find(whiteboard)
        .ok_or_else(|| WhiteboardError::NotFound(whiteboard.to_string()))?;
    canvas.remove_subscriber(username);
    session.stop_viewing(whiteboard);
    info!(username = %username, canvas = %whiteboard, "Whiteboard closed");
    Ok(Reply::Ack)
}

/// Release everything a departing session holds: its connection entry, its
/// username and its place on every whiteboard. Safe to call more than once.
pub fn end_session(state: &ServerState, session: &mut Session) {
    state.detach(session.conn_id());
    if let Some(username) = session.username().map(str::to_string) {
        state.directory.unregister(&username);
        for canvas in state.registry.all() {
            canvas.remove_subscriber(&username);
        }
    }
    session.state = SessionState::Closed;
}
