//! Minimal synchronous SCU for exercising the endpoint over TCP.
//!
//! Mostly based on
//! https://github.com/Enet4/dicom-rs/tree/7c0e5ab895e2f57c432cece41077f13abd4d7f71/findscu

use std::io::Read;
use std::time::Duration;

use dicom::core::Tag;
use dicom::dictionary_std::{tags, uids};
use dicom::object::InMemDicomObject;
use dicom::transfer_syntax::entries;
use dicom::ul::pdu::{PDataValue, PDataValueType};
use dicom::ul::{ClientAssociationOptions, Pdu};

pub(crate) const CALLING_AE_TITLE: &str = "QUADSCPTEST";
pub(crate) const CALLED_AE_TITLE: &str = "DICOMDEMO";

const PENDING: u16 = 0xFF00;

pub(crate) struct DimseResponse {
    pub command: InMemDicomObject,
    pub data: Option<InMemDicomObject>,
}

impl DimseResponse {
    pub(crate) fn status(&self) -> u16 {
        self.command
            .element(tags::STATUS)
            .unwrap()
            .to_int()
            .unwrap()
    }

    /// A C-MOVE sub-operation counter from the response command set.
    pub(crate) fn counter(&self, element: u16) -> u16 {
        self.command
            .element(Tag(0x0000, element))
            .unwrap()
            .to_int()
            .unwrap()
    }
}

macro_rules! establish {
    ($addr:expr, $abstract_syntax:expr) => {{
        let mut attempts = 0;
        loop {
            let options = ClientAssociationOptions::new()
                .calling_ae_title(CALLING_AE_TITLE)
                .called_ae_title(CALLED_AE_TITLE)
                .max_pdu_length(16384)
                .with_presentation_context(
                    $abstract_syntax,
                    vec![uids::IMPLICIT_VR_LITTLE_ENDIAN],
                );
            match options.establish_with($addr) {
                Ok(scu) => break scu,
                Err(e) => {
                    attempts += 1;
                    if attempts > 50 {
                        panic!("could not establish association with {}: {}", $addr, e);
                    }
                    std::thread::sleep(Duration::from_millis(100));
                }
            }
        }
    }};
}

/// Encode a data set in Implicit VR Little Endian, as it goes on the wire.
pub(crate) fn encode(data_set: &InMemDicomObject) -> Vec<u8> {
    let ts = entries::IMPLICIT_VR_LITTLE_ENDIAN.erased();
    let mut buf = Vec::with_capacity(2048);
    data_set.write_dataset_with_ts(&mut buf, &ts).unwrap();
    buf
}

/// Send DIMSE request messages over one association, then collect responses
/// until each message has been answered with a terminal status.
pub(crate) fn exchange(
    addr: &str,
    abstract_syntax: &str,
    messages: Vec<(InMemDicomObject, Option<InMemDicomObject>)>,
) -> Vec<DimseResponse> {
    let expected_terminals = messages.len();
    let messages = messages
        .into_iter()
        .map(|(command, data_set)| (command, data_set.map(|d| encode(&d))))
        .collect();
    exchange_encoded(addr, abstract_syntax, messages, expected_terminals)
}

/// Like [exchange], but with pre-encoded data set bytes and an explicit
/// number of terminal responses to wait for. Lets a test send a payload the
/// SCP cannot decode, which draws no response at all.
pub(crate) fn exchange_encoded(
    addr: &str,
    abstract_syntax: &str,
    messages: Vec<(InMemDicomObject, Option<Vec<u8>>)>,
    expected_terminals: usize,
) -> Vec<DimseResponse> {
    let mut scu = establish!(addr, abstract_syntax);
    let pc = scu
        .presentation_contexts()
        .first()
        .expect("no presentation context accepted")
        .clone();
    let ts = entries::IMPLICIT_VR_LITTLE_ENDIAN.erased();

    for (command, data_set) in messages {
        let mut cmd_data = Vec::with_capacity(128);
        command.write_dataset_with_ts(&mut cmd_data, &ts).unwrap();
        scu.send(&Pdu::PData {
            data: vec![PDataValue {
                presentation_context_id: pc.id,
                value_type: PDataValueType::Command,
                is_last: true,
                data: cmd_data,
            }],
        })
        .unwrap();
        if let Some(obj_data) = data_set {
            scu.send(&Pdu::PData {
                data: vec![PDataValue {
                    presentation_context_id: pc.id,
                    value_type: PDataValueType::Data,
                    is_last: true,
                    data: obj_data,
                }],
            })
            .unwrap();
        }
    }

    let mut responses = Vec::new();
    let mut terminals = 0;
    while terminals < expected_terminals {
        match scu.receive().unwrap() {
            Pdu::PData { data } => {
                let value = &data[0];
                assert_eq!(value.value_type, PDataValueType::Command);
                let command =
                    InMemDicomObject::read_dataset_with_ts(&value.data[..], &ts).unwrap();
                let has_data = command
                    .element(tags::COMMAND_DATA_SET_TYPE)
                    .unwrap()
                    .to_int::<u16>()
                    .unwrap()
                    != 0x0101;
                let data_set = if has_data {
                    let mut buf = Vec::new();
                    scu.receive_pdata().read_to_end(&mut buf).unwrap();
                    Some(InMemDicomObject::read_dataset_with_ts(&buf[..], &ts).unwrap())
                } else {
                    None
                };
                let response = DimseResponse {
                    command,
                    data: data_set,
                };
                if response.status() != PENDING {
                    terminals += 1;
                }
                responses.push(response);
            }
            pdu => panic!("Unexpected SCP response: {:?}", pdu),
        }
    }
    scu.release().unwrap();
    responses
}

/// Send request messages and expect the SCP to abort the association.
pub(crate) fn expect_abort(
    addr: &str,
    abstract_syntax: &str,
    messages: Vec<(InMemDicomObject, Option<InMemDicomObject>)>,
) {
    let mut scu = establish!(addr, abstract_syntax);
    let pc_id = scu
        .presentation_contexts()
        .first()
        .expect("no presentation context accepted")
        .id;
    let ts = entries::IMPLICIT_VR_LITTLE_ENDIAN.erased();
    for (command, data_set) in messages {
        let mut cmd_data = Vec::with_capacity(128);
        command.write_dataset_with_ts(&mut cmd_data, &ts).unwrap();
        let sent = scu.send(&Pdu::PData {
            data: vec![PDataValue {
                presentation_context_id: pc_id,
                value_type: PDataValueType::Command,
                is_last: true,
                data: cmd_data,
            }],
        });
        if sent.is_err() {
            // the SCP already tore the connection down
            return;
        }
        if let Some(data_set) = data_set {
            let obj_data = encode(&data_set);
            if scu
                .send(&Pdu::PData {
                    data: vec![PDataValue {
                        presentation_context_id: pc_id,
                        value_type: PDataValueType::Data,
                        is_last: true,
                        data: obj_data,
                    }],
                })
                .is_err()
            {
                return;
            }
        }
    }
    match scu.receive() {
        Ok(Pdu::AbortRQ { .. }) => {}
        Ok(pdu) => panic!("expected abort, got {:?}", pdu),
        // the SCP may have torn the connection down already
        Err(_) => {}
    }
}
