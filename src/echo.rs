//! The verification workflow. C-ECHO has no payload and cannot fail.

use crate::commands::{EchoRequest, ServiceResponse, echo_rsp};

pub(crate) fn run_echo(request: &EchoRequest) -> ServiceResponse {
    tracing::info!(message_id = request.message_id, "C-ECHO verified");
    echo_rsp(request.message_id)
}
