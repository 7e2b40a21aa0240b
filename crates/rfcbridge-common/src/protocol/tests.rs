//! Tests for the protocol module
//!
//! These cover the dynamic value model and its JSON interop, date/time
//! validation, descriptor builders, connection parameters and attributes,
//! and the error types.

#[cfg(test)]
mod tests {
    use super::super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_value_from_host_scalars() {
        assert_eq!(Value::from("abc"), Value::Text("abc".into()));
        assert_eq!(Value::from(7i32), Value::I32(7));
        assert_eq!(Value::from(255u8), Value::U8(255));
        assert_eq!(Value::from(1.5f64), Value::Float(1.5));
        assert_eq!(Value::from(vec![1u8, 2]), Value::Bytes(vec![1, 2]));
    }

    #[test]
    fn test_value_integer_widening() {
        assert_eq!(Value::I8(-128).as_integer(), Some(-128));
        assert_eq!(Value::U64(u64::MAX).as_integer(), Some(u64::MAX as i128));
        assert_eq!(Value::Float(1.0).as_integer(), None);
        assert_eq!(Value::Text("1".into()).as_integer(), None);
    }

    #[test]
    fn test_value_get_on_structure_and_fields() {
        let keyed = Value::structure([("A", Value::I32(1))]);
        let ordered = Value::fields([("A", Value::I32(1)), ("B", Value::Null)]);
        assert_eq!(keyed.get("A"), Some(&Value::I32(1)));
        assert_eq!(ordered.get("B"), Some(&Value::Null));
        assert_eq!(Value::I32(1).get("A"), None);
    }

    #[test]
    fn test_value_from_json() {
        let value = Value::from_json(json!({
            "NAME": "demo",
            "COUNT": 3,
            "BIG": u64::MAX,
            "RATIO": 0.5,
            "FLAG": true,
            "ROWS": [1, null],
        }));

        assert_eq!(value.get("NAME"), Some(&Value::Text("demo".into())));
        assert_eq!(value.get("COUNT"), Some(&Value::I64(3)));
        assert_eq!(value.get("BIG"), Some(&Value::U64(u64::MAX)));
        assert_eq!(value.get("RATIO"), Some(&Value::Float(0.5)));
        assert_eq!(value.get("FLAG"), Some(&Value::Text("X".into())));
        assert_eq!(
            value.get("ROWS"),
            Some(&Value::Table(vec![Value::I64(1), Value::Null]))
        );
    }

    #[test]
    fn test_value_to_json() {
        let value = Value::structure([
            ("BYTES", Value::Bytes(vec![0xde, 0xad, 0x01])),
            ("DATE", Value::Date(Date::new(2024, 2, 29).unwrap())),
            ("TIME", Value::Time(Time::new(23, 59, 5).unwrap())),
            ("NAN", Value::Float(f64::NAN)),
            ("ROWS", Value::table([Value::I16(-1)])),
        ]);

        assert_eq!(
            value.to_json(),
            json!({
                "BYTES": "dead01",
                "DATE": "2024-02-29",
                "TIME": "23:59:05",
                "NAN": null,
                "ROWS": [-1],
            })
        );
    }

    #[test]
    fn test_fields_serialize_in_order() {
        let value = Value::fields([("Z", Value::I32(1)), ("A", Value::I32(2))]);
        let text = serde_json::to_string(&value).unwrap();
        assert_eq!(text, r#"{"Z":1,"A":2}"#);
    }

    #[test]
    fn test_date_validation() {
        assert!(Date::new(1, 1, 1).is_some());
        assert!(Date::new(9999, 12, 31).is_some());
        assert!(Date::new(2024, 2, 29).is_some());
        assert!(Date::new(2023, 2, 29).is_none());
        assert!(Date::new(1900, 2, 29).is_none());
        assert!(Date::new(2000, 2, 29).is_some());
        assert!(Date::new(0, 1, 1).is_none());
        assert!(Date::new(2024, 13, 1).is_none());
        assert!(Date::new(2024, 4, 31).is_none());
    }

    #[test]
    fn test_date_digits() {
        let date = Date::from_digits("00010101").unwrap();
        assert_eq!((date.year(), date.month(), date.day()), (1, 1, 1));
        assert_eq!(date.to_digits(), "00010101");
        assert_eq!(Date::from_digits("99991231").unwrap().to_string(), "9999-12-31");
        assert!(Date::from_digits("2024023").is_none());
        assert!(Date::from_digits("2024-2-1").is_none());
        assert!(Date::from_digits("00000000").is_none());
    }

    #[test]
    fn test_time_digits() {
        assert_eq!(Time::from_digits("000000").unwrap(), Time::new(0, 0, 0).unwrap());
        assert_eq!(Time::from_digits("235959").unwrap().to_string(), "23:59:59");
        assert_eq!(Time::new(7, 5, 3).unwrap().to_digits(), "070503");
        assert!(Time::from_digits("240000").is_none());
        assert!(Time::from_digits("12 000").is_none());
    }

    #[test]
    fn test_rfc_type_codes() {
        for code in [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 17, 23, 24, 29, 30, 31, 32] {
            let kind = RfcType::from_code(code);
            assert!(!matches!(kind, RfcType::Unsupported(_)), "code {} unsupported", code);
            assert_eq!(kind.code(), code);
        }
        assert_eq!(RfcType::from_code(99), RfcType::Unsupported(99));
        assert_eq!(RfcType::Unsupported(99).to_string(), "RFCTYPE_99");
        assert_eq!(RfcType::Int1.to_string(), "RFCTYPE_INT1");
    }

    #[test]
    fn test_direction_codes() {
        assert_eq!(Direction::from_code(1), Some(Direction::Import));
        assert_eq!(Direction::from_code(2), Some(Direction::Export));
        assert_eq!(Direction::from_code(3), Some(Direction::Changing));
        assert_eq!(Direction::from_code(7), Some(Direction::Tables));
        assert_eq!(Direction::from_code(4), None);
    }

    #[test]
    fn test_type_description_layout() {
        let line = TypeDescription::new("ZLINE")
            .field(FieldDescription::new("NAME", RfcType::Char, 10))
            .field(FieldDescription::new("COUNT", RfcType::Int, 4))
            .field(FieldDescription::new("DAY", RfcType::Date, 8));

        assert_eq!(line.nuc_length, 22);
        assert_eq!(line.uc_length, 20 + 4 + 16);
        assert_eq!(line.fields[1].nuc_offset, 10);
        assert_eq!(line.fields[1].uc_offset, 20);
        assert_eq!(line.fields[2].uc_offset, 24);
        assert!(line.field_by_name("COUNT").is_some());
        assert!(line.field_by_name("MISSING").is_none());
        assert!(!line.is_elementary_line());

        let elementary = TypeDescription::new("").field(FieldDescription::new("", RfcType::Int, 4));
        assert!(elementary.is_elementary_line());
    }

    #[test]
    fn test_function_description_lookup() {
        let line = Arc::new(TypeDescription::new("ZLINE").field(FieldDescription::new("A", RfcType::Int, 4)));
        let desc = FunctionDescription::new("Z_TEST")
            .parameter(ParameterDescription::new("IV_TEXT", RfcType::Char, Direction::Import, 10))
            .parameter(ParameterDescription::complex("ET_ROWS", RfcType::Table, Direction::Tables, line));

        assert_eq!(desc.parameter_by_name("IV_TEXT").unwrap().uc_length, 20);
        assert_eq!(desc.parameter_by_name("ET_ROWS").unwrap().nuc_length, 4);
        assert!(desc.parameter_by_name("NOPE").is_none());
        assert!(desc.to_string().starts_with("FunctionDescription Z_TEST"));
    }

    #[test]
    fn test_function_description_serializes_nested_types() {
        let line = Arc::new(TypeDescription::new("ZLINE").field(FieldDescription::new("A", RfcType::Int, 4)));
        let desc = FunctionDescription::new("Z_TEST")
            .parameter(ParameterDescription::complex("ET_ROWS", RfcType::Table, Direction::Tables, line.clone()))
            .parameter(ParameterDescription::complex("ES_ROW", RfcType::Structure, Direction::Export, line));

        let json = serde_json::to_value(&desc).unwrap();
        let params = json["parameters"].as_array().unwrap();
        assert_eq!(params.len(), 2);
        assert_eq!(params[0]["name"], "ET_ROWS");
        assert_eq!(params[0]["type_desc"]["name"], "ZLINE");
        assert_eq!(params[0]["type_desc"]["fields"][0]["name"], "A");
        assert_eq!(params[1]["type_desc"], params[0]["type_desc"]);
    }

    #[test]
    fn test_connection_parameters_lowercase_and_mask() {
        let params = ConnectionParameters::new()
            .with("ASHOST", "10.0.0.1")
            .with("User", "demo")
            .with("PASSWD", "secret");

        assert_eq!(params.get("ashost"), Some("10.0.0.1"));
        assert_eq!(params.get("USER"), Some("demo"));
        assert_eq!(params.len(), 3);

        let debug = format!("{:?}", params);
        assert!(debug.contains("********"));
        assert!(!debug.contains("secret"));
    }

    #[test]
    fn test_connection_parameters_serde() {
        let params: ConnectionParameters =
            serde_json::from_value(json!({"DEST": "QI3", "Client": "620"})).unwrap();
        assert_eq!(params.get("dest"), Some("QI3"));

        let back = serde_json::to_value(&params).unwrap();
        assert_eq!(back, json!({"client": "620", "dest": "QI3"}));
        assert_eq!(ConnectionParameters::from_dest("QI3").get("dest"), Some("QI3"));
    }

    #[test]
    fn test_connection_parameters_keep_insertion_order() {
        let params = ConnectionParameters::new()
            .with("user", "demo")
            .with("ashost", "10.0.0.1")
            .with("client", "620")
            .with("USER", "other");
        let names: Vec<&str> = params.iter().map(|(k, _)| k).collect();
        assert_eq!(names, ["user", "ashost", "client"]);
        assert_eq!(params.get("user"), Some("other"));

        let parsed: ConnectionParameters =
            serde_json::from_str(r#"{"sysnr": "00", "Dest": "QI3", "ashost": "h"}"#).unwrap();
        let names: Vec<&str> = parsed.iter().map(|(k, _)| k).collect();
        assert_eq!(names, ["sysnr", "dest", "ashost"]);
        assert_eq!(
            serde_json::to_string(&parsed).unwrap(),
            r#"{"sysnr":"00","dest":"QI3","ashost":"h"}"#
        );
    }

    #[test]
    fn test_connection_attributes_from_raw() {
        let mut raw = RawAttributes::new();
        let mut sysid: Vec<u16> = "QI3".encode_utf16().collect();
        sysid.resize(Attribute::SysId.width(), b' ' as u16);
        raw.insert(Attribute::SysId, sysid);
        raw.insert(Attribute::PartnerIp, "127.0.0.1".encode_utf16().collect());

        let stripped = ConnectionAttributes::from_raw(&raw, true).unwrap();
        assert_eq!(stripped.sys_id, "QI3");
        assert_eq!(stripped.get(Attribute::PartnerIp), "127.0.0.1");
        assert_eq!(stripped.user, "");

        let padded = ConnectionAttributes::from_raw(&raw, false).unwrap();
        assert_eq!(padded.sys_id, "QI3     ");

        let json = serde_json::to_value(&stripped).unwrap();
        assert_eq!(json["sysId"], "QI3");
        assert_eq!(json["partnerIP"], "127.0.0.1");
        assert!(json.get("type").is_some());
    }

    #[test]
    fn test_attribute_decoded_at_declared_width() {
        let mut raw = RawAttributes::new();
        raw.insert(Attribute::Client, "6201234".encode_utf16().collect());
        let attrs = ConnectionAttributes::from_raw(&raw, true).unwrap();
        assert_eq!(attrs.client, "620");
    }

    #[test]
    fn test_error_info_display_and_key() {
        let info = ErrorInfo::new(ReturnCode::LogonFailure, "Name or password is incorrect");
        assert_eq!(info.key, "RFC_LOGON_FAILURE");
        assert!(info.to_string().starts_with("[Name or password is incorrect, RFC_LOGON_FAILURE"));

        let exception = ErrorInfo::abap_exception("NOT_FOUND", "no data")
            .with_abap_message("SR", "E", "046")
            .with_message_variables(["A", "B", "", ""]);
        assert_eq!(exception.code, ReturnCode::AbapException);
        assert_eq!(exception.key, "NOT_FOUND");
        assert_eq!(exception.message_variables(), ["A", "B", "", ""]);
        assert_eq!(serde_json::to_value(&exception).unwrap()["code"], "RFC_ABAP_EXCEPTION");
    }

    #[test]
    fn test_rfc_error_helpers() {
        let remote = RfcError::remote("Could not open connection", ErrorInfo::new(ReturnCode::Closed, "gone"));
        assert!(remote.is_remote());
        assert_eq!(remote.remote_info().unwrap().code, ReturnCode::Closed);
        assert!(remote.to_string().starts_with("Could not open connection | [gone"));

        let marshal: RfcError = MarshalError::FieldNotFound("XXX".into()).into();
        assert!(marshal.is_marshal());
        assert_eq!(marshal.to_string(), "field 'XXX' not found");

        let recovered = RfcError::DeadlineExceeded {
            function: "Z_WAIT".into(),
            timeout_ms: 2000,
            cancel: None,
            reopen: None,
        };
        assert!(recovered.is_recovered_timeout());
        assert_eq!(
            recovered.to_string(),
            "Call to 'Z_WAIT' exceeded its deadline of 2000ms"
        );

        let broken = RfcError::DeadlineExceeded {
            function: "Z_WAIT".into(),
            timeout_ms: 2000,
            cancel: None,
            reopen: Some(Box::new(RfcError::Internal("offline".into()))),
        };
        assert!(!broken.is_recovered_timeout());
        assert!(broken.to_string().ends_with("; reopen failed: Internal error: offline"));
    }
}
