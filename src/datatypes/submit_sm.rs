use crate::codec::{
    CodecError, Decodable, Encodable, PduHeader, decode_cstring, decode_u8, encode_cstring,
    encode_u8,
};
use crate::datatypes::{
    AddressError, CommandId, CommandStatus, DestinationAddr, NumericPlanIndicator, ServiceType,
    ShortMessage, SourceAddr, Tlv, TypeOfNumber,
};
use crate::macros::{encode_optional_tlvs, size_optional_tlvs};
use bytes::{Buf, BufMut, BytesMut};
use std::io::Cursor;
use thiserror::Error;

/// Validation errors for SubmitSm PDU
#[derive(Debug, Error)]
pub enum SubmitSmValidationError {
    #[error("Service type error: {0}")]
    ServiceType(#[from] crate::datatypes::ServiceTypeError),
    #[error("Address error: {0}")]
    Address(#[from] AddressError),
    #[error("Short message error: {0}")]
    ShortMessage(#[from] crate::datatypes::FixedStringError),
}

/// This operation is used by an ESME to submit a short message to the SMSC for onward transmission
/// to a specified short message entity (SME). The submit_sm PDU does not support the transaction
/// message mode.
///
/// ## References
/// - SMPP v3.4 Specification Section 4.4.1
#[derive(Clone, Debug, PartialEq)]
pub struct SubmitSm {
    pub command_status: CommandStatus,
    pub sequence_number: u32,

    // Mandatory parameters
    pub service_type: ServiceType,
    pub source_addr_ton: TypeOfNumber,
    pub source_addr_npi: NumericPlanIndicator,
    pub source_addr: SourceAddr,
    pub dest_addr_ton: TypeOfNumber,
    pub dest_addr_npi: NumericPlanIndicator,
    pub destination_addr: DestinationAddr,
    pub esm_class: u8,
    pub protocol_id: u8,
    pub priority_flag: u8,
    pub schedule_delivery_time: crate::datatypes::ScheduleDeliveryTime,
    pub validity_period: crate::datatypes::ValidityPeriod,
    pub registered_delivery: u8,
    pub replace_if_present_flag: u8,
    pub data_coding: u8,
    pub sm_default_msg_id: u8,
    pub short_message: ShortMessage,

    // Optional parameters (TLVs)
    pub user_message_reference: Option<Tlv>,
    pub source_port: Option<Tlv>,
    pub source_addr_submit: Option<Tlv>,
    pub destination_port: Option<Tlv>,
    pub dest_addr_submit: Option<Tlv>,
    pub sar_msg_ref_num: Option<Tlv>,
    pub sar_total_segments: Option<Tlv>,
    pub sar_segment_seqnum: Option<Tlv>,
    pub more_messages_to_send: Option<Tlv>,
    pub payload_type: Option<Tlv>,
    pub message_payload: Option<Tlv>,
    pub privacy_indicator: Option<Tlv>,
    pub callback_num: Option<Tlv>,
    pub callback_num_pres_ind: Option<Tlv>,
    pub callback_num_atag: Option<Tlv>,
    pub source_subaddress: Option<Tlv>,
    pub dest_subaddress: Option<Tlv>,
    pub display_time: Option<Tlv>,
    pub sms_signal: Option<Tlv>,
    pub ms_validity: Option<Tlv>,
    pub ms_msg_wait_facilities: Option<Tlv>,
    pub number_of_messages: Option<Tlv>,
    pub alert_on_msg_delivery: Option<Tlv>,
    pub language_indicator: Option<Tlv>,
    pub its_reply_type: Option<Tlv>,
    pub its_session_info: Option<Tlv>,
    pub ussd_service_op: Option<Tlv>,
    /// Caller-chosen correlation id, carried under tag `receipted_message_id` so the
    /// DLR that eventually arrives can be matched back to this submission.
    pub receipted_message_id: Option<Tlv>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SubmitSmResponse {
    pub command_status: CommandStatus,
    pub sequence_number: u32,
    pub message_id: crate::datatypes::MessageId,
}

impl SubmitSm {
    /// Attaches the caller's message_id as the `receipted_message_id` TLV (tag 0x001E).
    pub fn with_tracking_id(mut self, message_id: &str) -> Self {
        self.receipted_message_id = Some(Tlv {
            tag: crate::datatypes::tlv::tags::RECEIPTED_MESSAGE_ID,
            length: message_id.len() as u16,
            value: bytes::Bytes::copy_from_slice(message_id.as_bytes()),
        });
        self
    }
}

impl Encodable for SubmitSm {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        buf.put_u32(0); // command_length placeholder, fixed up by to_bytes()
        buf.put_u32(CommandId::SubmitSm as u32);
        buf.put_u32(self.command_status as u32);
        buf.put_u32(self.sequence_number);

        encode_cstring(buf, self.service_type.as_str(), 6);
        encode_u8(buf, self.source_addr_ton as u8);
        encode_u8(buf, self.source_addr_npi as u8);
        encode_cstring(buf, self.source_addr.as_str().unwrap_or(""), 21);
        encode_u8(buf, self.dest_addr_ton as u8);
        encode_u8(buf, self.dest_addr_npi as u8);
        encode_cstring(buf, self.destination_addr.as_str().unwrap_or(""), 21);
        encode_u8(buf, self.esm_class);
        encode_u8(buf, self.protocol_id);
        encode_u8(buf, self.priority_flag);
        encode_cstring(buf, self.schedule_delivery_time.as_str().unwrap_or(""), 17);
        encode_cstring(buf, self.validity_period.as_str().unwrap_or(""), 17);
        encode_u8(buf, self.registered_delivery);
        encode_u8(buf, self.replace_if_present_flag);
        encode_u8(buf, self.data_coding);
        encode_u8(buf, self.sm_default_msg_id);
        encode_u8(buf, self.short_message.len());
        buf.extend_from_slice(self.short_message.as_bytes());

        encode_optional_tlvs!(
            self,
            buf,
            user_message_reference,
            source_port,
            source_addr_submit,
            destination_port,
            dest_addr_submit,
            sar_msg_ref_num,
            sar_total_segments,
            sar_segment_seqnum,
            more_messages_to_send,
            payload_type,
            message_payload,
            privacy_indicator,
            callback_num,
            callback_num_pres_ind,
            callback_num_atag,
            source_subaddress,
            dest_subaddress,
            display_time,
            sms_signal,
            ms_validity,
            ms_msg_wait_facilities,
            number_of_messages,
            alert_on_msg_delivery,
            language_indicator,
            its_reply_type,
            its_session_info,
            ussd_service_op,
            receipted_message_id,
        );

        Ok(())
    }

    fn encoded_size(&self) -> usize {
        let mut size =
            16 + 6 + 1 + 1 + 21 + 1 + 1 + 21 + 1 + 1 + 1 + 17 + 17 + 1 + 1 + 1 + 1 + 1;
        size += self.short_message.len() as usize;

        size_optional_tlvs!(
            size,
            self,
            user_message_reference,
            source_port,
            source_addr_submit,
            destination_port,
            dest_addr_submit,
            sar_msg_ref_num,
            sar_total_segments,
            sar_segment_seqnum,
            more_messages_to_send,
            payload_type,
            message_payload,
            privacy_indicator,
            callback_num,
            callback_num_pres_ind,
            callback_num_atag,
            source_subaddress,
            dest_subaddress,
            display_time,
            sms_signal,
            ms_validity,
            ms_msg_wait_facilities,
            number_of_messages,
            alert_on_msg_delivery,
            language_indicator,
            its_reply_type,
            its_session_info,
            ussd_service_op,
            receipted_message_id,
        );

        size
    }
}

impl Decodable for SubmitSm {
    fn command_id() -> CommandId {
        CommandId::SubmitSm
    }

    fn decode(header: PduHeader, buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        Self::validate_header(&header)?;

        let service_type_str = decode_cstring(buf, 6, "service_type")?;
        let service_type =
            ServiceType::new(&service_type_str).map_err(|e| CodecError::FieldValidation {
                field: "service_type",
                reason: e.to_string(),
            })?;

        let source_addr_ton =
            TypeOfNumber::try_from(decode_u8(buf)?).map_err(|_| CodecError::FieldValidation {
                field: "source_addr_ton",
                reason: "Invalid TypeOfNumber value".to_string(),
            })?;
        let source_addr_npi = NumericPlanIndicator::try_from(decode_u8(buf)?).map_err(|_| {
            CodecError::FieldValidation {
                field: "source_addr_npi",
                reason: "Invalid NumericPlanIndicator value".to_string(),
            }
        })?;
        let source_addr_str = decode_cstring(buf, 21, "source_addr")?;
        let source_addr =
            SourceAddr::new(&source_addr_str, source_addr_ton).map_err(|e| {
                CodecError::FieldValidation {
                    field: "source_addr",
                    reason: e.to_string(),
                }
            })?;

        let dest_addr_ton =
            TypeOfNumber::try_from(decode_u8(buf)?).map_err(|_| CodecError::FieldValidation {
                field: "dest_addr_ton",
                reason: "Invalid TypeOfNumber value".to_string(),
            })?;
        let dest_addr_npi = NumericPlanIndicator::try_from(decode_u8(buf)?).map_err(|_| {
            CodecError::FieldValidation {
                field: "dest_addr_npi",
                reason: "Invalid NumericPlanIndicator value".to_string(),
            }
        })?;
        let destination_addr_str = decode_cstring(buf, 21, "destination_addr")?;
        let destination_addr = DestinationAddr::new(&destination_addr_str, dest_addr_ton)
            .map_err(|e| CodecError::FieldValidation {
                field: "destination_addr",
                reason: e.to_string(),
            })?;

        let esm_class = decode_u8(buf)?;
        let protocol_id = decode_u8(buf)?;
        let priority_flag = decode_u8(buf)?;

        let schedule_str = decode_cstring(buf, 17, "schedule_delivery_time")?;
        let schedule_delivery_time =
            crate::datatypes::ScheduleDeliveryTime::new(&schedule_str).map_err(|e| {
                CodecError::FieldValidation {
                    field: "schedule_delivery_time",
                    reason: e.to_string(),
                }
            })?;

        let validity_str = decode_cstring(buf, 17, "validity_period")?;
        let validity_period =
            crate::datatypes::ValidityPeriod::new(&validity_str).map_err(|e| {
                CodecError::FieldValidation {
                    field: "validity_period",
                    reason: e.to_string(),
                }
            })?;

        let registered_delivery = decode_u8(buf)?;
        let replace_if_present_flag = decode_u8(buf)?;
        let data_coding = decode_u8(buf)?;
        let sm_default_msg_id = decode_u8(buf)?;

        let sm_length = decode_u8(buf)? as usize;
        if buf.remaining() < sm_length {
            return Err(CodecError::Incomplete);
        }
        let mut sm_bytes = vec![0u8; sm_length];
        buf.copy_to_slice(&mut sm_bytes);
        let short_message =
            ShortMessage::new(&sm_bytes).map_err(|e| CodecError::FieldValidation {
                field: "short_message",
                reason: e.to_string(),
            })?;

        let mut pdu = SubmitSm {
            command_status: header.command_status,
            sequence_number: header.sequence_number,
            service_type,
            source_addr_ton,
            source_addr_npi,
            source_addr,
            dest_addr_ton,
            dest_addr_npi,
            destination_addr,
            esm_class,
            protocol_id,
            priority_flag,
            schedule_delivery_time,
            validity_period,
            registered_delivery,
            replace_if_present_flag,
            data_coding,
            sm_default_msg_id,
            short_message,
            user_message_reference: None,
            source_port: None,
            source_addr_submit: None,
            destination_port: None,
            dest_addr_submit: None,
            sar_msg_ref_num: None,
            sar_total_segments: None,
            sar_segment_seqnum: None,
            more_messages_to_send: None,
            payload_type: None,
            message_payload: None,
            privacy_indicator: None,
            callback_num: None,
            callback_num_pres_ind: None,
            callback_num_atag: None,
            source_subaddress: None,
            dest_subaddress: None,
            display_time: None,
            sms_signal: None,
            ms_validity: None,
            ms_msg_wait_facilities: None,
            number_of_messages: None,
            alert_on_msg_delivery: None,
            language_indicator: None,
            its_reply_type: None,
            its_session_info: None,
            ussd_service_op: None,
            receipted_message_id: None,
        };

        while buf.remaining() > 0 {
            let tlv = match Tlv::decode(buf) {
                Ok(tlv) => tlv,
                Err(CodecError::Incomplete) => break,
                Err(e) => return Err(e),
            };
            use crate::datatypes::tlv::tags;
            match tlv.tag {
                tags::USER_MESSAGE_REFERENCE => pdu.user_message_reference = Some(tlv),
                tags::SOURCE_PORT => pdu.source_port = Some(tlv),
                tags::SOURCE_ADDR_SUBMIT => pdu.source_addr_submit = Some(tlv),
                tags::DESTINATION_PORT => pdu.destination_port = Some(tlv),
                tags::DEST_ADDR_SUBMIT => pdu.dest_addr_submit = Some(tlv),
                tags::SAR_MSG_REF_NUM => pdu.sar_msg_ref_num = Some(tlv),
                tags::SAR_TOTAL_SEGMENTS => pdu.sar_total_segments = Some(tlv),
                tags::SAR_SEGMENT_SEQNUM => pdu.sar_segment_seqnum = Some(tlv),
                tags::MORE_MESSAGES_TO_SEND => pdu.more_messages_to_send = Some(tlv),
                tags::PAYLOAD_TYPE => pdu.payload_type = Some(tlv),
                tags::MESSAGE_PAYLOAD => pdu.message_payload = Some(tlv),
                tags::PRIVACY_INDICATOR => pdu.privacy_indicator = Some(tlv),
                tags::CALLBACK_NUM => pdu.callback_num = Some(tlv),
                tags::CALLBACK_NUM_PRES_IND => pdu.callback_num_pres_ind = Some(tlv),
                tags::CALLBACK_NUM_ATAG => pdu.callback_num_atag = Some(tlv),
                tags::SOURCE_SUBADDRESS => pdu.source_subaddress = Some(tlv),
                tags::DEST_SUBADDRESS => pdu.dest_subaddress = Some(tlv),
                tags::DISPLAY_TIME => pdu.display_time = Some(tlv),
                tags::SMS_SIGNAL => pdu.sms_signal = Some(tlv),
                tags::MS_VALIDITY => pdu.ms_validity = Some(tlv),
                tags::MS_MSG_WAIT_FACILITIES => pdu.ms_msg_wait_facilities = Some(tlv),
                tags::NUMBER_OF_MESSAGES => pdu.number_of_messages = Some(tlv),
                tags::ALERT_ON_MSG_DELIVERY => pdu.alert_on_msg_delivery = Some(tlv),
                tags::LANGUAGE_INDICATOR => pdu.language_indicator = Some(tlv),
                tags::ITS_REPLY_TYPE => pdu.its_reply_type = Some(tlv),
                tags::ITS_SESSION_INFO => pdu.its_session_info = Some(tlv),
                tags::USSD_SERVICE_OP => pdu.ussd_service_op = Some(tlv),
                tags::RECEIPTED_MESSAGE_ID => pdu.receipted_message_id = Some(tlv),
                _ => {}
            }
        }

        Ok(pdu)
    }
}

impl Encodable for SubmitSmResponse {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        buf.put_u32(0);
        buf.put_u32(CommandId::SubmitSmResp as u32);
        buf.put_u32(self.command_status as u32);
        buf.put_u32(self.sequence_number);
        buf.extend_from_slice(self.message_id.as_str_bytes());
        buf.put_u8(0);
        Ok(())
    }

    fn encoded_size(&self) -> usize {
        PduHeader::SIZE + self.message_id.len() + 1
    }
}

impl Decodable for SubmitSmResponse {
    fn command_id() -> CommandId {
        CommandId::SubmitSmResp
    }

    fn decode(header: PduHeader, buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        Self::validate_header(&header)?;
        let message_id_str = decode_cstring(buf, 65, "message_id")?;
        let message_id =
            message_id_str
                .parse()
                .map_err(|e: crate::datatypes::FixedStringError| CodecError::FieldValidation {
                    field: "message_id",
                    reason: e.to_string(),
                })?;

        Ok(SubmitSmResponse {
            command_status: header.command_status,
            sequence_number: header.sequence_number,
            message_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SubmitSm {
        SubmitSm {
            command_status: CommandStatus::Ok,
            sequence_number: 7,
            service_type: ServiceType::Default,
            source_addr_ton: TypeOfNumber::International,
            source_addr_npi: NumericPlanIndicator::Isdn,
            source_addr: SourceAddr::new("SVC", TypeOfNumber::International).unwrap(),
            dest_addr_ton: TypeOfNumber::International,
            dest_addr_npi: NumericPlanIndicator::Isdn,
            destination_addr: DestinationAddr::new(
                "254700000001",
                TypeOfNumber::International,
            )
            .unwrap(),
            esm_class: 0,
            protocol_id: 0,
            priority_flag: 0,
            schedule_delivery_time: Default::default(),
            validity_period: Default::default(),
            registered_delivery: 1,
            replace_if_present_flag: 0,
            data_coding: 0,
            sm_default_msg_id: 0,
            short_message: ShortMessage::new(b"hello").unwrap(),
            user_message_reference: None,
            source_port: None,
            source_addr_submit: None,
            destination_port: None,
            dest_addr_submit: None,
            sar_msg_ref_num: None,
            sar_total_segments: None,
            sar_segment_seqnum: None,
            more_messages_to_send: None,
            payload_type: None,
            message_payload: None,
            privacy_indicator: None,
            callback_num: None,
            callback_num_pres_ind: None,
            callback_num_atag: None,
            source_subaddress: None,
            dest_subaddress: None,
            display_time: None,
            sms_signal: None,
            ms_validity: None,
            ms_msg_wait_facilities: None,
            number_of_messages: None,
            alert_on_msg_delivery: None,
            language_indicator: None,
            its_reply_type: None,
            its_session_info: None,
            ussd_service_op: None,
            receipted_message_id: None,
        }
    }

    #[test]
    fn submit_sm_roundtrip() {
        let original = sample().with_tracking_id("abc-123");
        let bytes = Encodable::to_bytes(&original);

        let mut cursor = Cursor::new(bytes.as_ref());
        let header = PduHeader::decode(&mut cursor).unwrap();
        let decoded = SubmitSm::decode(header, &mut cursor).unwrap();

        assert_eq!(decoded.sequence_number, original.sequence_number);
        assert_eq!(decoded.source_addr, original.source_addr);
        assert_eq!(decoded.destination_addr, original.destination_addr);
        assert_eq!(decoded.short_message, original.short_message);
        assert_eq!(
            decoded.receipted_message_id.unwrap().value,
            original.receipted_message_id.unwrap().value
        );
    }

    #[test]
    fn submit_sm_response_roundtrip() {
        let original = SubmitSmResponse {
            command_status: CommandStatus::Ok,
            sequence_number: 9,
            message_id: "SMSC-001".parse().unwrap(),
        };
        let bytes = Encodable::to_bytes(&original);

        let mut cursor = Cursor::new(bytes.as_ref());
        let header = PduHeader::decode(&mut cursor).unwrap();
        let decoded = SubmitSmResponse::decode(header, &mut cursor).unwrap();

        assert_eq!(decoded.message_id, original.message_id);
        assert_eq!(decoded.sequence_number, original.sequence_number);
    }
}
