//! The move workflow: report sub-operation progress for a C-MOVE request.
//!
//! Actually opening an outbound store association to the destination is the
//! backend's concern. The workflow here owns the response sequencing: one
//! pending response with updated counters per finished sub-operation, then
//! a terminal status whose counters add up to the planned total.

use dicom::dictionary_std::tags;
use either::Either;

use crate::commands::{MoveRequest, ServiceResponse, Status, SubOpCounters, move_rsp, search_key};
use crate::dicomrs_settings::ClientAETitle;

/// How a single sub-operation (one instance sent to the destination) ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubOpOutcome {
    Completed,
    Failed,
    Warning,
}

/// The work a backend has planned for one C-MOVE request.
pub struct MovePlan {
    /// How many sub-operations will run. The initial remaining count.
    pub total: u16,
    /// Outcomes in execution order. Pulling the next item performs the
    /// next sub-operation.
    pub sub_operations: Box<dyn Iterator<Item = SubOpOutcome> + Send>,
}

#[derive(thiserror::Error, Debug)]
pub enum MoveError {
    /// Reported as status `0xA801`.
    #[error("unknown move destination \"{0}\"")]
    UnknownDestination(ClientAETitle),

    /// Reported as status `0xC000`.
    #[error("{0}")]
    Backend(String),
}

impl MoveError {
    fn status(&self) -> Status {
        match self {
            MoveError::UnknownDestination(_) => Status::MOVE_DESTINATION_UNKNOWN,
            MoveError::Backend(_) => Status::UNABLE_TO_PROCESS,
        }
    }
}

/// Plans and executes the sub-operations of a C-MOVE.
pub trait MoveBackend: Send + Sync {
    fn plan(
        &self,
        destination: &ClientAETitle,
        identifier: &dicom::object::InMemDicomObject,
    ) -> Result<MovePlan, MoveError>;
}

/// Respond to a C-MOVE: a pending response after every sub-operation,
/// then a terminal response with the final counters.
pub(crate) fn run_move(
    backend: &dyn MoveBackend,
    request: MoveRequest,
) -> impl Iterator<Item = ServiceResponse> {
    let plan = match backend.plan(&request.destination, &request.identifier) {
        Ok(plan) => plan,
        Err(e) => {
            tracing::warn!(
                destination = request.destination.as_str(),
                error = e.to_string(),
                "C-MOVE rejected"
            );
            let status = e.status();
            return Either::Left(std::iter::once(move_rsp(
                &request,
                status,
                SubOpCounters::default(),
            )));
        }
    };
    tracing::info!(
        destination = request.destination.as_str(),
        study_instance_uid = search_key(&request.identifier, tags::STUDY_INSTANCE_UID),
        patient_id = search_key(&request.identifier, tags::PATIENT_ID),
        total = plan.total,
        "C-MOVE planned"
    );

    let mut sub_operations = plan.sub_operations;
    let mut counters = SubOpCounters {
        remaining: plan.total,
        ..SubOpCounters::default()
    };
    let mut finished = false;
    Either::Right(std::iter::from_fn(move || {
        if finished {
            return None;
        }
        match sub_operations.next() {
            Some(outcome) => {
                counters.remaining = counters.remaining.saturating_sub(1);
                match outcome {
                    SubOpOutcome::Completed => counters.completed += 1,
                    SubOpOutcome::Failed => counters.failed += 1,
                    SubOpOutcome::Warning => counters.warning += 1,
                }
                Some(move_rsp(&request, Status::Pending, counters))
            }
            None => {
                finished = true;
                counters.remaining = 0;
                Some(move_rsp(&request, Status::Success, counters))
            }
        }
    }))
}

/// A backend that pretends to move exactly one instance, successfully,
/// without opening any outbound association.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedMove;

impl MoveBackend for SimulatedMove {
    fn plan(
        &self,
        _destination: &ClientAETitle,
        _identifier: &dicom::object::InMemDicomObject,
    ) -> Result<MovePlan, MoveError> {
        Ok(MovePlan {
            total: 1,
            sub_operations: Box::new(std::iter::once(SubOpOutcome::Completed)),
        })
    }
}
