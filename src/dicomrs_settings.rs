//! Settings for the dicom-rs association layer.
use aliri_braid::braid;
use dicom::dictionary_std::uids;
use dicom::transfer_syntax::TransferSyntaxRegistry;
use dicom::ul::ServerAssociationOptions;
use dicom::ul::association::server::AcceptAny;

/// Our AE title.
#[braid(serde)]
pub struct OurAETitle;

/// The AE title of a peer connected to us.
#[braid(serde)]
pub struct ClientAETitle;

/// Association acceptance policy shared by all four listeners.
///
/// The policy is deliberately permissive: every proposed abstract syntax is
/// accepted (`promiscuous`), and every transfer syntax known to the registry
/// is offered unless `uncompressed_only` narrows the list down to the two
/// uncompressed little-endian syntaxes.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct DicomRsSettings {
    /// Our AE title.
    #[serde(default = "default_aet")]
    pub aet: OurAETitle,
    /// Whether receiving PDUs must not surpass the negotiated maximum PDU length.
    #[serde(default)]
    pub strict: bool,
    /// Only accept uncompressed transfer syntaxes.
    #[serde(default)]
    pub uncompressed_only: bool,
    /// Maximum size in bytes of a single PDU.
    #[serde(default = "default_max_pdu_length")]
    pub max_pdu_length: u32,
}

impl Default for DicomRsSettings {
    fn default() -> Self {
        Self {
            aet: default_aet(),
            strict: false,
            uncompressed_only: false,
            max_pdu_length: default_max_pdu_length(),
        }
    }
}

impl<'a> From<DicomRsSettings> for ServerAssociationOptions<'a, AcceptAny> {
    fn from(settings: DicomRsSettings) -> Self {
        let mut options = ServerAssociationOptions::new()
            .accept_any()
            .ae_title(settings.aet.to_string())
            .strict(settings.strict)
            .max_pdu_length(settings.max_pdu_length);
        if settings.uncompressed_only {
            options = options
                .with_transfer_syntax(uids::IMPLICIT_VR_LITTLE_ENDIAN)
                .with_transfer_syntax(uids::EXPLICIT_VR_LITTLE_ENDIAN);
        } else {
            for ts in TransferSyntaxRegistry.iter() {
                if !ts.is_unsupported() {
                    options = options.with_transfer_syntax(ts.uid());
                }
            }
        };
        options.promiscuous(true)
    }
}

fn default_aet() -> OurAETitle {
    OurAETitle::from_static("DICOMDEMO")
}

fn default_max_pdu_length() -> u32 {
    16384
}
