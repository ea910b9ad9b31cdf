//! The connection-scoped state machine: two coupled per-role FSMs plus the
//! cross-role rules (keep-alive latching, protocol-switch negotiation) that
//! couple them.
//!
//! Both [`crate::Connection::send`] and [`crate::Connection::receive_data`]
//! drive the same [`ConnectionState::apply`] regardless of which role the
//! event belongs to -- "our" `Request` and a peer's parsed `Request` have
//! identical effects on the combined state, which is the point of modeling
//! this as a single transition function rather than two independent FSMs
//! that happen to share some variables.
//!
//! The two per-role machines are driven by event-triggered transitions (an
//! event arrives in a given state, producing a new one) and coupled by
//! state-triggered transitions: whenever certain *joint* configurations of
//! `(client, server, keep_alive, pending_switch_proposals)` are reached, a
//! further transition fires automatically, regardless of how that
//! configuration was reached. [`ConnectionState::fire_state_triggered_transitions`]
//! runs these to a fixed point after every event.

use bytes::Bytes;
use http::header::UPGRADE;

use crate::error::{Error, Parse};
use crate::event::{Event, HttpVersion, Role, State};
use crate::headers::{connection_has_token, has_expect_100_continue, HeaderList};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SwitchProposal {
    Upgrade,
    Connect,
}

#[derive(Debug)]
pub(crate) struct ConnectionState {
    our_role: Role,
    client: State,
    server: State,
    keep_alive: bool,
    pending_switch_proposals: Vec<SwitchProposal>,
    their_http_version: Option<HttpVersion>,
    request_method: Option<Bytes>,
    client_is_waiting_for_100_continue: bool,
}

impl ConnectionState {
    pub(crate) fn new(our_role: Role) -> ConnectionState {
        ConnectionState {
            our_role,
            client: State::Idle,
            server: State::Idle,
            keep_alive: true,
            pending_switch_proposals: Vec::new(),
            their_http_version: None,
            request_method: None,
            client_is_waiting_for_100_continue: false,
        }
    }

    pub(crate) fn our_role(&self) -> Role {
        self.our_role
    }

    pub(crate) fn their_role(&self) -> Role {
        self.our_role.other()
    }

    pub(crate) fn state_of(&self, role: Role) -> State {
        match role {
            Role::Client => self.client,
            Role::Server => self.server,
        }
    }

    pub(crate) fn our_state(&self) -> State {
        self.state_of(self.our_role)
    }

    pub(crate) fn their_state(&self) -> State {
        self.state_of(self.their_role())
    }

    pub(crate) fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    pub(crate) fn their_http_version(&self) -> Option<HttpVersion> {
        self.their_http_version
    }

    pub(crate) fn request_method(&self) -> Option<&[u8]> {
        self.request_method.as_deref()
    }

    pub(crate) fn client_is_waiting_for_100_continue(&self) -> bool {
        self.client_is_waiting_for_100_continue
    }

    fn set_state(&mut self, role: Role, state: State) {
        match role {
            Role::Client => self.client = state,
            Role::Server => self.server = state,
        }
    }

    fn has_proposal(&self, proposal: SwitchProposal) -> bool {
        self.pending_switch_proposals.contains(&proposal)
    }

    /// True if a pending `CONNECT` proposal would be committed by a
    /// response with `status_code`. Used by the façade to decide, before
    /// writing or reading a single byte of the response, whether the
    /// outgoing/incoming body framing applies at all.
    pub(crate) fn connect_would_commit(&self, status_code: u16) -> bool {
        self.has_proposal(SwitchProposal::Connect) && (200..300).contains(&status_code)
    }

    /// Any role may move to `ERROR` from any state; the *other* role is
    /// left untouched, so e.g. a server can still answer a 4xx after a
    /// malformed client request poisoned only the client side. Like any
    /// other state change, this can unlock further state-triggered
    /// transitions (e.g. the peer being stuck `DONE` while we `ERROR` out
    /// forces it to `MUST_CLOSE`).
    pub(crate) fn process_error(&mut self, role: Role) {
        self.set_state(role, State::Error);
        self.fire_state_triggered_transitions();
    }

    fn latch_keep_alive(&mut self, headers: &HeaderList, version: HttpVersion) {
        if !self.keep_alive {
            return;
        }
        if version < HttpVersion::HTTP_11 || connection_has_token(headers, "close") {
            self.keep_alive = false;
        }
    }

    /// Applies the effect of `event`, which belongs to `role` (the side of
    /// the exchange that either sent it, or whose bytes it was parsed
    /// from -- the two are symmetric as far as this function is concerned).
    pub(crate) fn apply(&mut self, role: Role, event: &Event) -> Result<(), Error> {
        let result = match event {
            Event::Request {
                method,
                headers,
                http_version,
                ..
            } => self.apply_request(role, event, method, headers, http_version),
            Event::InformationalResponse {
                status_code,
                headers,
                http_version,
            } => self.apply_informational(role, event, *status_code, headers, http_version),
            Event::Response {
                status_code,
                headers,
                http_version,
            } => self.apply_response(role, event, *status_code, headers, http_version),
            Event::Data { .. } | Event::EndOfMessage { .. } | Event::ConnectionClosed => {
                self.apply_generic(role, event)
            }
            Event::Paused { .. } => Ok(()),
        };
        result?;
        self.fire_state_triggered_transitions();
        Ok(())
    }

    fn apply_generic(&mut self, role: Role, event: &Event) -> Result<(), Error> {
        let new_state = match role {
            Role::Client => transition_client(self.client, event),
            Role::Server => transition_server(self.server, event, false, false),
        }
        .ok_or_else(Error::new_unexpected_message)?;
        self.set_state(role, new_state);
        if role == Role::Client && matches!(event, Event::Data { .. } | Event::EndOfMessage { .. }) {
            self.client_is_waiting_for_100_continue = false;
        }
        Ok(())
    }

    fn apply_request(
        &mut self,
        role: Role,
        event: &Event,
        method: &[u8],
        headers: &HeaderList,
        http_version: &[u8],
    ) -> Result<(), Error> {
        if role != Role::Client {
            return Err(Error::new_unexpected_message());
        }
        let new_client_state =
            transition_client(self.client, event).ok_or_else(Error::new_unexpected_message)?;
        // The server machine sees every client Request too, via a special
        // always-fires transition: it does not matter whether the request
        // carries a switch proposal, the server unconditionally owes a
        // response (or informational responses) next.
        if self.server != State::Idle {
            return Err(Error::new_unexpected_message());
        }

        let version =
            HttpVersion::parse(http_version).ok_or_else(|| Error::new_parse(Parse::Version))?;

        if has_expect_100_continue(to_http_version(version), headers) {
            if self.client_is_waiting_for_100_continue {
                return Err(Error::new_already_waiting_for_100_continue());
            }
            self.client_is_waiting_for_100_continue = true;
        }

        self.request_method = Some(Bytes::copy_from_slice(method));
        self.pending_switch_proposals = proposals_from_request(method, headers);
        self.latch_keep_alive(headers, version);
        if role == self.their_role() {
            self.their_http_version = Some(version);
        }

        self.client = new_client_state;
        self.server = State::SendResponse;
        Ok(())
    }

    fn apply_informational(
        &mut self,
        role: Role,
        event: &Event,
        status_code: u16,
        headers: &HeaderList,
        http_version: &[u8],
    ) -> Result<(), Error> {
        if role != Role::Server {
            return Err(Error::new_unexpected_message());
        }
        let committing_upgrade = status_code == 101 && self.has_proposal(SwitchProposal::Upgrade);
        let new_server_state = transition_server(self.server, event, committing_upgrade, false)
            .ok_or_else(Error::new_unexpected_message)?;

        let version =
            HttpVersion::parse(http_version).ok_or_else(|| Error::new_parse(Parse::Version))?;
        if role == self.their_role() {
            self.their_http_version = Some(version);
        }
        self.client_is_waiting_for_100_continue = false;
        // A `Connection: close` header on an informational response is
        // intentionally ignored (see DESIGN.md).
        let _ = headers;

        self.server = new_server_state;
        Ok(())
    }

    fn apply_response(
        &mut self,
        role: Role,
        event: &Event,
        status_code: u16,
        headers: &HeaderList,
        http_version: &[u8],
    ) -> Result<(), Error> {
        if role != Role::Server {
            return Err(Error::new_unexpected_message());
        }
        let committing_connect =
            self.has_proposal(SwitchProposal::Connect) && (200..300).contains(&status_code);
        if !committing_connect {
            // A response that doesn't commit a pending CONNECT declines it,
            // whether or not one was ever pending.
            self.pending_switch_proposals.clear();
        }
        let new_server_state = transition_server(self.server, event, false, committing_connect)
            .ok_or_else(Error::new_unexpected_message)?;

        let version =
            HttpVersion::parse(http_version).ok_or_else(|| Error::new_parse(Parse::Version))?;
        if role == self.their_role() {
            self.their_http_version = Some(version);
        }
        self.client_is_waiting_for_100_continue = false;
        self.latch_keep_alive(headers, version);

        self.server = new_server_state;
        Ok(())
    }

    /// Runs the state-triggered rules that couple the client and server
    /// machines to each other and to `keep_alive`/`pending_switch_proposals`,
    /// to a fixed point. These don't care how a joint state was reached --
    /// only that it was -- so they have to be re-run after every mutation,
    /// not just checked once inline where a mutation happens.
    fn fire_state_triggered_transitions(&mut self) {
        loop {
            let start = (self.client, self.server);

            // It can happen that both of these are enabled at once (e.g. an
            // HTTP/1.0 CONNECT with `Connection: close`): the protocol
            // switch takes priority. If it's declined, the client lands back
            // on `DONE` and `MUST_CLOSE` catches it on the next iteration.
            if !self.pending_switch_proposals.is_empty() && self.client == State::Done {
                self.client = State::MightSwitchProtocol;
            }
            if self.pending_switch_proposals.is_empty() && self.client == State::MightSwitchProtocol {
                self.client = State::Done;
            }

            if !self.keep_alive {
                if self.client == State::Done {
                    self.client = State::MustClose;
                }
                if self.server == State::Done {
                    self.server = State::MustClose;
                }
            }

            match (self.client, self.server) {
                (State::MightSwitchProtocol, State::SwitchedProtocol) => {
                    self.client = State::SwitchedProtocol;
                }
                (State::Closed, State::Done)
                | (State::Closed, State::Idle)
                | (State::Error, State::Done) => {
                    self.server = State::MustClose;
                }
                (State::Done, State::Closed)
                | (State::Idle, State::Closed)
                | (State::Done, State::Error) => {
                    self.client = State::MustClose;
                }
                _ => {}
            }

            if (self.client, self.server) == start {
                return;
            }
        }
    }

    /// Resets both roles to `IDLE` for a new request/response pair on the
    /// same byte stream. `their_http_version` survives the reset; every
    /// other piece of per-exchange state is cleared.
    pub(crate) fn prepare_to_reuse(&mut self) -> Result<(), Error> {
        if self.client != State::Done
            || self.server != State::Done
            || !self.keep_alive
            || self.client_is_waiting_for_100_continue
        {
            return Err(Error::new_not_ready_to_reuse());
        }
        self.client = State::Idle;
        self.server = State::Idle;
        self.request_method = None;
        self.pending_switch_proposals.clear();
        Ok(())
    }
}

/// The client machine's event-triggered transition table. Every branch not
/// listed is a protocol violation: wrong event for the state we're in.
fn transition_client(state: State, event: &Event) -> Option<State> {
    use State::*;
    match (state, event) {
        (Idle, Event::Request { .. }) => Some(SendBody),
        (Idle, Event::ConnectionClosed) => Some(Closed),
        (SendBody, Event::Data { .. }) => Some(SendBody),
        (SendBody, Event::EndOfMessage { .. }) => Some(Done),
        (Done, Event::ConnectionClosed) => Some(Closed),
        (MustClose, Event::ConnectionClosed) => Some(Closed),
        (Closed, Event::ConnectionClosed) => Some(Closed),
        _ => None,
    }
}

/// The server machine's event-triggered transition table. `committing_upgrade`
/// and `committing_connect` annotate an `InformationalResponse`/`Response`
/// as the one that commits an already-pending switch proposal -- the server
/// machine has no `MIGHT_SWITCH_PROTOCOL` state of its own; it goes straight
/// from `SEND_RESPONSE` to `SWITCHED_PROTOCOL` the instant the commit is seen.
fn transition_server(
    state: State,
    event: &Event,
    committing_upgrade: bool,
    committing_connect: bool,
) -> Option<State> {
    use State::*;
    match (state, event) {
        (Idle, Event::ConnectionClosed) => Some(Closed),
        (Idle, Event::Response { .. }) => Some(SendBody),
        (SendResponse, Event::InformationalResponse { .. }) => Some(if committing_upgrade {
            SwitchedProtocol
        } else {
            SendResponse
        }),
        (SendResponse, Event::Response { .. }) => {
            Some(if committing_connect { SwitchedProtocol } else { SendBody })
        }
        (SendBody, Event::Data { .. }) => Some(SendBody),
        (SendBody, Event::EndOfMessage { .. }) => Some(Done),
        (Done, Event::ConnectionClosed) => Some(Closed),
        (MustClose, Event::ConnectionClosed) => Some(Closed),
        (Closed, Event::ConnectionClosed) => Some(Closed),
        _ => None,
    }
}

fn to_http_version(v: HttpVersion) -> http::Version {
    if v == HttpVersion::HTTP_10 {
        http::Version::HTTP_10
    } else {
        http::Version::HTTP_11
    }
}

fn proposals_from_request(method: &[u8], headers: &HeaderList) -> Vec<SwitchProposal> {
    let mut proposals = Vec::new();
    if method.eq_ignore_ascii_case(b"CONNECT") {
        proposals.push(SwitchProposal::Connect);
    }
    if headers.iter().any(|(name, _)| *name == UPGRADE) {
        proposals.push(SwitchProposal::Upgrade);
    }
    proposals
}
