//! Session metadata reported by the remote side.

use std::collections::HashMap;

use serde::Serialize;

use super::error::MarshalError;
use crate::transport::codec::TextCodec;

/// Fixed-width attribute slots of a remote session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    Dest,
    Host,
    PartnerHost,
    SysNumber,
    SysId,
    Client,
    User,
    Language,
    Trace,
    IsoLanguage,
    Codepage,
    PartnerCodepage,
    RfcRole,
    Type,
    PartnerType,
    Rel,
    PartnerRel,
    KernelRel,
    CpicConvId,
    ProgName,
    PartnerBytesPerChar,
    PartnerSystemCodepage,
    PartnerIp,
    PartnerIpv6,
}

impl Attribute {
    pub const ALL: [Attribute; 24] = [
        Attribute::Dest,
        Attribute::Host,
        Attribute::PartnerHost,
        Attribute::SysNumber,
        Attribute::SysId,
        Attribute::Client,
        Attribute::User,
        Attribute::Language,
        Attribute::Trace,
        Attribute::IsoLanguage,
        Attribute::Codepage,
        Attribute::PartnerCodepage,
        Attribute::RfcRole,
        Attribute::Type,
        Attribute::PartnerType,
        Attribute::Rel,
        Attribute::PartnerRel,
        Attribute::KernelRel,
        Attribute::CpicConvId,
        Attribute::ProgName,
        Attribute::PartnerBytesPerChar,
        Attribute::PartnerSystemCodepage,
        Attribute::PartnerIp,
        Attribute::PartnerIpv6,
    ];

    /// Declared width in remote code units.
    pub fn width(&self) -> usize {
        match self {
            Attribute::Dest => 64,
            Attribute::Host | Attribute::PartnerHost => 100,
            Attribute::SysNumber => 2,
            Attribute::SysId => 8,
            Attribute::Client => 3,
            Attribute::User => 12,
            Attribute::Language | Attribute::IsoLanguage => 2,
            Attribute::Trace | Attribute::RfcRole | Attribute::Type | Attribute::PartnerType => 1,
            Attribute::Codepage | Attribute::PartnerCodepage | Attribute::PartnerSystemCodepage => 4,
            Attribute::Rel | Attribute::PartnerRel | Attribute::KernelRel => 4,
            Attribute::CpicConvId => 8,
            Attribute::ProgName => 128,
            Attribute::PartnerBytesPerChar => 1,
            Attribute::PartnerIp => 15,
            Attribute::PartnerIpv6 => 45,
        }
    }
}

/// Raw attribute slots as the remote session hands them over.
pub type RawAttributes = HashMap<Attribute, Vec<u16>>;

/// Immutable snapshot of the remote session metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionAttributes {
    pub dest: String,
    pub host: String,
    pub partner_host: String,
    pub sys_number: String,
    pub sys_id: String,
    pub client: String,
    pub user: String,
    pub language: String,
    pub trace: String,
    pub iso_language: String,
    pub codepage: String,
    pub partner_codepage: String,
    pub rfc_role: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub partner_type: String,
    pub rel: String,
    pub partner_rel: String,
    pub kernel_rel: String,
    pub cpic_conv_id: String,
    pub prog_name: String,
    pub partner_bytes_per_char: String,
    pub partner_system_codepage: String,
    #[serde(rename = "partnerIP")]
    pub partner_ip: String,
    #[serde(rename = "partnerIPv6")]
    pub partner_ipv6: String,
}

impl ConnectionAttributes {
    /// Decodes each slot at its declared width. Missing slots decode as empty.
    pub fn from_raw(raw: &RawAttributes, strip: bool) -> Result<Self, MarshalError> {
        let mut attrs = ConnectionAttributes::default();
        for attr in Attribute::ALL {
            let value = match raw.get(&attr) {
                Some(units) => TextCodec::decode(units, attr.width(), strip)?,
                None => String::new(),
            };
            *attrs.slot_mut(attr) = value;
        }
        Ok(attrs)
    }

    pub fn get(&self, attr: Attribute) -> &str {
        match attr {
            Attribute::Dest => &self.dest,
            Attribute::Host => &self.host,
            Attribute::PartnerHost => &self.partner_host,
            Attribute::SysNumber => &self.sys_number,
            Attribute::SysId => &self.sys_id,
            Attribute::Client => &self.client,
            Attribute::User => &self.user,
            Attribute::Language => &self.language,
            Attribute::Trace => &self.trace,
            Attribute::IsoLanguage => &self.iso_language,
            Attribute::Codepage => &self.codepage,
            Attribute::PartnerCodepage => &self.partner_codepage,
            Attribute::RfcRole => &self.rfc_role,
            Attribute::Type => &self.kind,
            Attribute::PartnerType => &self.partner_type,
            Attribute::Rel => &self.rel,
            Attribute::PartnerRel => &self.partner_rel,
            Attribute::KernelRel => &self.kernel_rel,
            Attribute::CpicConvId => &self.cpic_conv_id,
            Attribute::ProgName => &self.prog_name,
            Attribute::PartnerBytesPerChar => &self.partner_bytes_per_char,
            Attribute::PartnerSystemCodepage => &self.partner_system_codepage,
            Attribute::PartnerIp => &self.partner_ip,
            Attribute::PartnerIpv6 => &self.partner_ipv6,
        }
    }

    fn slot_mut(&mut self, attr: Attribute) -> &mut String {
        match attr {
            Attribute::Dest => &mut self.dest,
            Attribute::Host => &mut self.host,
            Attribute::PartnerHost => &mut self.partner_host,
            Attribute::SysNumber => &mut self.sys_number,
            Attribute::SysId => &mut self.sys_id,
            Attribute::Client => &mut self.client,
            Attribute::User => &mut self.user,
            Attribute::Language => &mut self.language,
            Attribute::Trace => &mut self.trace,
            Attribute::IsoLanguage => &mut self.iso_language,
            Attribute::Codepage => &mut self.codepage,
            Attribute::PartnerCodepage => &mut self.partner_codepage,
            Attribute::RfcRole => &mut self.rfc_role,
            Attribute::Type => &mut self.kind,
            Attribute::PartnerType => &mut self.partner_type,
            Attribute::Rel => &mut self.rel,
            Attribute::PartnerRel => &mut self.partner_rel,
            Attribute::KernelRel => &mut self.kernel_rel,
            Attribute::CpicConvId => &mut self.cpic_conv_id,
            Attribute::ProgName => &mut self.prog_name,
            Attribute::PartnerBytesPerChar => &mut self.partner_bytes_per_char,
            Attribute::PartnerSystemCodepage => &mut self.partner_system_codepage,
            Attribute::PartnerIp => &mut self.partner_ip,
            Attribute::PartnerIpv6 => &mut self.partner_ipv6,
        }
    }
}
