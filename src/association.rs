//! Serves one accepted TCP connection: association negotiation, DIMSE
//! message assembly, dispatch to the port's workflow, and teardown.

use std::net::TcpStream;

use dicom::encoding::TransferSyntaxIndex;
use dicom::object::InMemDicomObject;
use dicom::transfer_syntax::TransferSyntaxRegistry;
use dicom::ul::association::server::AcceptAny;
use dicom::ul::pdu::{PDataValue, PDataValueType};
use dicom::ul::{Pdu, ServerAssociationOptions};
use ulid::Ulid;

use crate::association_error::{AssociationError, AssociationError::*};
use crate::commands::{
    C_CANCEL_RQ, ServiceRequest, ServiceResponse, announces_data_set, command_field_of,
};
use crate::echo::run_echo;
use crate::find::run_find;
use crate::mover::run_move;
use crate::service::ServiceHandler;
use crate::state::AssociationState;
use crate::store::run_store;

/// A fully assembled DIMSE message: command set, the data set that followed
/// it (if announced), and the presentation context it arrived on.
struct AssembledMessage {
    command: InMemDicomObject,
    data: Option<InMemDicomObject>,
    presentation_context_id: u8,
}

/// Serve one association from accept to teardown.
///
/// `association_id` labels all log records of this connection.
pub(crate) fn handle_association(
    scu_stream: TcpStream,
    options: &ServerAssociationOptions<AcceptAny>,
    handler: &ServiceHandler,
    max_pdu_length: usize,
    association_id: Ulid,
) -> Result<(), AssociationError> {
    let mut state = AssociationState::Idle;
    state = state.transition(AssociationState::Negotiating)?;
    let mut association = match options.establish(scu_stream) {
        Ok(association) => association,
        Err(e) => {
            // a rejected or garbled A-ASSOCIATE proposal never becomes active
            let _ = state.transition(AssociationState::Closed);
            return Err(CouldNotEstablish(e));
        }
    };
    state = state.transition(AssociationState::Active)?;
    tracing::info!(
        association = association_id.to_string(),
        aec = association.client_ae_title(),
        "Association established"
    );

    let mut command_buffer: Vec<u8> = Vec::with_capacity(max_pdu_length);
    let mut data_buffer: Vec<u8> = Vec::with_capacity(1024 * 1024);
    let mut pending_command: Option<(InMemDicomObject, u8)> = None;

    while let Some(pdu) = bubble_no_pdu(association.receive())? {
        tracing::trace!("scu ----> scp: {}", pdu.short_description());
        match pdu {
            Pdu::PData { data } => {
                if !state.may_dispatch() {
                    let _ = association.abort();
                    return Err(NotActive(state));
                }
                let mut assembled: Vec<AssembledMessage> = Vec::new();
                for mut value in data {
                    match value.value_type {
                        // commands are always in implicit VR LE
                        PDataValueType::Command => {
                            if pending_command.is_some() {
                                // the previous command announced a data set
                                // which never arrived
                                let _ = association.abort();
                                return Err(CommandWhileAwaitingData);
                            }
                            command_buffer.append(&mut value.data);
                            if !value.is_last {
                                continue;
                            }
                            let ts = dicom::transfer_syntax::entries::IMPLICIT_VR_LITTLE_ENDIAN
                                .erased();
                            let command = InMemDicomObject::read_dataset_with_ts(
                                command_buffer.as_slice(),
                                &ts,
                            )
                            .map_err(FailedToReadCommand)?;
                            command_buffer.clear();
                            if announces_data_set(&command) {
                                pending_command =
                                    Some((command, value.presentation_context_id));
                            } else {
                                assembled.push(AssembledMessage {
                                    command,
                                    data: None,
                                    presentation_context_id: value.presentation_context_id,
                                });
                            }
                        }
                        PDataValueType::Data => {
                            if pending_command.is_none() {
                                let _ = association.abort();
                                return Err(DataWithoutCommand);
                            }
                            data_buffer.append(&mut value.data);
                            if !value.is_last {
                                continue;
                            }
                            let ts_uid = transfer_syntax_of(
                                association.presentation_contexts(),
                                value.presentation_context_id,
                            )?;
                            let ts = TransferSyntaxRegistry
                                .get(&ts_uid)
                                .ok_or_else(|| UnsupportedTransferSyntax(ts_uid.clone()))?;
                            let decoded =
                                InMemDicomObject::read_dataset_with_ts(data_buffer.as_slice(), ts);
                            data_buffer.clear();
                            let (command, presentation_context_id) = pending_command
                                .take()
                                .ok_or(DataWithoutCommand)?;
                            match decoded {
                                Ok(data) => assembled.push(AssembledMessage {
                                    command,
                                    data: Some(data),
                                    presentation_context_id,
                                }),
                                // an undecodable data set gets no response;
                                // the association stays up for the next message
                                Err(e) => {
                                    tracing::error!(
                                        association = association_id.to_string(),
                                        event = "staging",
                                        error = e.to_string(),
                                        "could not read incoming data set"
                                    );
                                }
                            }
                        }
                    }
                }

                for message in assembled {
                    let command_field = command_field_of(&message.command)?;
                    if command_field == C_CANCEL_RQ {
                        tracing::warn!(
                            association = association_id.to_string(),
                            "C-CANCEL-RQ received, ignoring"
                        );
                        continue;
                    }
                    let request = match ServiceRequest::parse(&message.command, message.data) {
                        Ok(request) => request,
                        Err(e) => {
                            let _ = association.abort();
                            return Err(e);
                        }
                    };
                    let ts_uid = transfer_syntax_of(
                        association.presentation_contexts(),
                        message.presentation_context_id,
                    )?;
                    let responses: Box<dyn Iterator<Item = ServiceResponse> + '_> =
                        match (handler, request) {
                            (ServiceHandler::Verification, ServiceRequest::Echo(request)) => {
                                Box::new(std::iter::once(run_echo(&request)))
                            }
                            (ServiceHandler::Query(matcher), ServiceRequest::Find(request)) => {
                                Box::new(run_find(matcher.as_ref(), request))
                            }
                            (ServiceHandler::Storage(sink), ServiceRequest::Store(request)) => {
                                Box::new(std::iter::once(run_store(sink, request, &ts_uid)))
                            }
                            (ServiceHandler::Move(backend), ServiceRequest::Move(request)) => {
                                Box::new(run_move(backend.as_ref(), request))
                            }
                            (handler, request) => {
                                let requested = request.kind();
                                let port = handler.kind();
                                let _ = association.abort();
                                return Err(WrongService { requested, port });
                            }
                        };
                    for response in responses {
                        for pdu in
                            response_pdus(response, message.presentation_context_id, &ts_uid)?
                        {
                            association
                                .send(&pdu)
                                .map_err(|_| CannotRespond("failed to send response to SCU"))?;
                        }
                    }
                }
            }
            Pdu::ReleaseRQ => {
                state = state.transition(AssociationState::Releasing)?;
                association
                    .send(&Pdu::ReleaseRP)
                    .map_err(|_| CannotRespond("failed to send release acknowledgment"))?;
                let _ = state.transition(AssociationState::Closed)?;
                tracing::info!(
                    association = association_id.to_string(),
                    "Released association with {}",
                    association.client_ae_title()
                );
                return Ok(());
            }
            Pdu::AbortRQ { source } => {
                let state = state.transition(AssociationState::Aborted)?;
                let _ = state.transition(AssociationState::Closed)?;
                return Err(Aborted(source));
            }
            pdu => {
                let description = pdu.short_description().to_string();
                let _ = association.abort();
                return Err(UnhandledPdu(description));
            }
        }
    }
    tracing::info!(
        association = association_id.to_string(),
        "Dropping connection with {}",
        association.client_ae_title()
    );
    Ok(())
}

/// The transfer syntax negotiated for a presentation context.
fn transfer_syntax_of(
    presentation_contexts: &[dicom::ul::pdu::PresentationContextResult],
    id: u8,
) -> Result<String, AssociationError> {
    presentation_contexts
        .iter()
        .find(|pc| pc.id == id)
        .map(|pc| pc.transfer_syntax.trim_end_matches('\0').to_string())
        .ok_or(MissingPresentationContext)
}

/// Encode a response as P-DATA PDUs: the command set in implicit VR LE,
/// then the data set (if any) in the context's negotiated transfer syntax.
fn response_pdus(
    response: ServiceResponse,
    presentation_context_id: u8,
    transfer_syntax: &str,
) -> Result<Vec<Pdu>, AssociationError> {
    let command_ts = dicom::transfer_syntax::entries::IMPLICIT_VR_LITTLE_ENDIAN.erased();
    let mut command_data = Vec::new();
    response
        .command
        .write_dataset_with_ts(&mut command_data, &command_ts)
        .map_err(|_| CannotRespond("could not write response command set"))?;
    let mut pdus = vec![Pdu::PData {
        data: vec![PDataValue {
            presentation_context_id,
            value_type: PDataValueType::Command,
            is_last: true,
            data: command_data,
        }],
    }];
    if let Some(data_set) = response.data {
        let ts = TransferSyntaxRegistry
            .get(transfer_syntax)
            .ok_or_else(|| UnsupportedTransferSyntax(transfer_syntax.to_string()))?;
        let mut data = Vec::new();
        data_set
            .write_dataset_with_ts(&mut data, ts)
            .map_err(|_| CannotRespond("could not write response data set"))?;
        pdus.push(Pdu::PData {
            data: vec![PDataValue {
                presentation_context_id,
                value_type: PDataValueType::Data,
                is_last: true,
                data,
            }],
        });
    }
    Ok(pdus)
}

/// Returns `None` if source is [dicom::ul::pdu::reader::Error::NoPduAvailable]
fn bubble_no_pdu(
    pdu: Result<Pdu, dicom::ul::association::server::Error>,
) -> Result<Option<Pdu>, dicom::ul::association::server::Error> {
    pdu.map(Some).or_else(|e| {
        if let dicom::ul::association::server::Error::Receive { source } = &e {
            if matches!(source, dicom::ul::pdu::reader::Error::NoPduAvailable { .. }) {
                Ok(None)
            } else {
                Err(e)
            }
        } else {
            Err(e)
        }
    })
}
