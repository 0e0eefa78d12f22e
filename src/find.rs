//! The query workflow: match a C-FIND identifier against a backend and
//! produce a pending response per match, then a terminal status.

use std::fmt::Display;
use std::str::FromStr;

use dicom::core::{DataElement, VR};
use dicom::dicom_value;
use dicom::dictionary_std::tags;
use dicom::object::InMemDicomObject;
use either::Either;
use time::macros::format_description;

use crate::commands::{FindRequest, ServiceResponse, Status, find_rsp, search_key};

/// Hierarchy level the matching keys apply to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryRetrieveLevel {
    Patient,
    Study,
    Series,
    Image,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum InvalidLevel {
    #[error("identifier has no QueryRetrieveLevel")]
    Missing,
    #[error("unrecognized QueryRetrieveLevel \"{0}\"")]
    Unrecognized(String),
}

impl FromStr for QueryRetrieveLevel {
    type Err = InvalidLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "PATIENT" => Ok(Self::Patient),
            "STUDY" => Ok(Self::Study),
            "SERIES" => Ok(Self::Series),
            "IMAGE" => Ok(Self::Image),
            other => Err(InvalidLevel::Unrecognized(other.to_string())),
        }
    }
}

impl Display for QueryRetrieveLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Patient => "PATIENT",
            Self::Study => "STUDY",
            Self::Series => "SERIES",
            Self::Image => "IMAGE",
        };
        f.write_str(name)
    }
}

impl FindRequest {
    /// The level requested by the identifier's QueryRetrieveLevel key.
    pub(crate) fn level(&self) -> Result<QueryRetrieveLevel, InvalidLevel> {
        let value = self
            .identifier
            .element(tags::QUERY_RETRIEVE_LEVEL)
            .map_err(|_| InvalidLevel::Missing)?
            .to_str()
            .map_err(|_| InvalidLevel::Missing)?;
        value.parse()
    }
}

/// A failure reported by a [QueryMatcher] mid-query.
#[derive(thiserror::Error, Debug)]
#[error("{0}")]
pub struct QueryError(pub String);

/// Source of query matches.
///
/// Implementations return a finite iterator so that matches are produced
/// lazily: each match becomes a pending response on the wire before the
/// next one is computed.
pub trait QueryMatcher: Send + Sync {
    fn query(
        &self,
        level: QueryRetrieveLevel,
        keys: &InMemDicomObject,
    ) -> Box<dyn Iterator<Item = Result<InMemDicomObject, QueryError>> + Send>;
}

/// Respond to a C-FIND: one pending response per match, then success.
/// A matcher error or an unusable identifier ends the sequence with
/// `0xC000` instead.
pub(crate) fn run_find(
    matcher: &dyn QueryMatcher,
    request: FindRequest,
) -> impl Iterator<Item = ServiceResponse> {
    let level = match request.level() {
        Ok(level) => level,
        Err(e) => {
            tracing::warn!(error = e.to_string(), "C-FIND identifier rejected");
            return Either::Left(std::iter::once(find_rsp(
                &request,
                Status::UNABLE_TO_PROCESS,
                None,
            )));
        }
    };
    tracing::info!(
        level = %level,
        patient_name = search_key(&request.identifier, tags::PATIENT_NAME),
        study_instance_uid = search_key(&request.identifier, tags::STUDY_INSTANCE_UID),
        "C-FIND query received"
    );

    let mut matches = matcher.query(level, &request.identifier);
    let mut finished = false;
    Either::Right(std::iter::from_fn(move || {
        if finished {
            return None;
        }
        match matches.next() {
            Some(Ok(result)) => Some(find_rsp(&request, Status::Pending, Some(result))),
            Some(Err(e)) => {
                finished = true;
                tracing::warn!(error = e.to_string(), "C-FIND matcher failed");
                Some(find_rsp(&request, Status::UNABLE_TO_PROCESS, None))
            }
            None => {
                finished = true;
                Some(find_rsp(&request, Status::Success, None))
            }
        }
    }))
}

/// A matcher with a single canned study, for running the endpoint without
/// a real index behind it.
#[derive(Debug, Clone, Copy, Default)]
pub struct DemoMatcher;

impl QueryMatcher for DemoMatcher {
    fn query(
        &self,
        _level: QueryRetrieveLevel,
        _keys: &InMemDicomObject,
    ) -> Box<dyn Iterator<Item = Result<InMemDicomObject, QueryError>> + Send> {
        Box::new(std::iter::once(Ok(demo_study())))
    }
}

fn demo_study() -> InMemDicomObject {
    let study_date = time::OffsetDateTime::now_utc()
        .date()
        .format(format_description!("[year][month][day]"))
        .unwrap_or_else(|_| "19000101".to_string());
    InMemDicomObject::from_element_iter([
        DataElement::new(
            tags::QUERY_RETRIEVE_LEVEL,
            VR::CS,
            dicom_value!(Str, "STUDY"),
        ),
        DataElement::new(tags::PATIENT_NAME, VR::PN, dicom_value!(Str, "Demo^Patient")),
        DataElement::new(tags::PATIENT_ID, VR::LO, dicom_value!(Str, "DEMO001")),
        DataElement::new(
            tags::STUDY_INSTANCE_UID,
            VR::UI,
            dicom_value!(Str, "1.2.3.4.5.6.7.8.9"),
        ),
        DataElement::new(tags::STUDY_DATE, VR::DA, dicom_value!(Str, study_date)),
        DataElement::new(
            tags::STUDY_DESCRIPTION,
            VR::LO,
            dicom_value!(Str, "Demo Study"),
        ),
        DataElement::new(
            tags::ACCESSION_NUMBER,
            VR::SH,
            dicom_value!(Str, "ACC001"),
        ),
    ])
}
