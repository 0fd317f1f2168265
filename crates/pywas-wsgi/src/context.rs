//! Per-call state shared by `start_response` and the result drain.

use pywas_core::{HandlerError, Response, SharedSink, SinkError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitState {
    /// Headers not yet handed to the sink; the response may still change.
    Pending,
    /// Headers are with the sink. Only body writes remain.
    Committed,
    /// The exchange is over. Any further use is an error.
    Invalidated,
}

pub struct CallContext {
    state: CommitState,
    response: Response,
    sink: SharedSink,
}

impl CallContext {
    pub fn new(sink: SharedSink) -> Self {
        Self {
            state: CommitState::Pending,
            response: Response::default(),
            sink,
        }
    }

    pub fn state(&self) -> CommitState {
        self.state
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    /// Replace the pending response. Only valid before commit.
    pub fn set_response(&mut self, response: Response) {
        debug_assert_eq!(self.state, CommitState::Pending);
        self.response = response;
    }

    /// Hand the headers to the sink if that has not happened yet.
    pub fn commit(&mut self) -> Result<(), HandlerError> {
        match self.state {
            CommitState::Committed => Ok(()),
            CommitState::Invalidated => Err(SinkError::AlreadyCommitted.into()),
            CommitState::Pending => {
                if !self.response.is_status_set() {
                    return Err(HandlerError::StartResponseNotCalled);
                }
                self.sink.borrow_mut().commit_headers(self.response.clone())?;
                self.state = CommitState::Committed;
                Ok(())
            }
        }
    }

    /// Commit if needed, then write one body chunk.
    pub fn write(&mut self, data: &[u8]) -> Result<(), HandlerError> {
        self.commit()?;
        self.sink.borrow_mut().write_body(data)?;
        Ok(())
    }

    /// Called once the result iterable is exhausted.
    ///
    /// A response that produced no body and declared no length is committed
    /// with an explicit zero length.
    pub fn finish(&mut self) -> Result<(), HandlerError> {
        if self.state == CommitState::Pending {
            if !self.response.is_status_set() {
                return Err(HandlerError::StartResponseNotCalled);
            }
            if self.response.content_length.is_none() {
                self.response.content_length = Some(0);
            }
        }
        self.commit()
    }

    pub fn invalidate(&mut self) {
        self.state = CommitState::Invalidated;
    }
}
