use afelink_rpc::{Exchange, Params, Response};
use serde_json::Value;

use crate::cmd::{CallArgs, LinkArgs};
use crate::exit::{rpc_error, CliError, CliResult, SUCCESS, TRANSPORT_ERROR};
use crate::output::{print_response, OutputFormat};

pub fn run(args: CallArgs, link: &LinkArgs, format: OutputFormat) -> CliResult<i32> {
    let params = parse_params(args.params.as_deref())?;

    let mut conn = link.connect()?;
    conn.set_canonicalize(!args.no_canonicalize);

    let response = call(&mut conn, &args.method, params, args.id)?;
    print_response(&response, format);
    Ok(SUCCESS)
}

fn parse_params(input: Option<&str>) -> CliResult<Params> {
    let Some(input) = input else {
        return Ok(Params::new());
    };
    match serde_json::from_str::<Value>(input) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(CliError::usage(format!(
            "--params must be a JSON object, got {other}"
        ))),
        Err(err) => Err(CliError::usage(format!("--params is not valid JSON: {err}"))),
    }
}

fn call<E: Exchange + ?Sized>(
    link: &mut E,
    method: &str,
    params: Params,
    id: Option<u64>,
) -> CliResult<Response> {
    link.exchange_request(method, params, id)
        .map_err(|err| rpc_error(&format!("{method} failed"), err))?
        .ok_or_else(|| CliError::new(TRANSPORT_ERROR, "serial port not open"))
}

#[cfg(test)]
mod tests {
    use afelink_rpc::Connection;
    use afelink_transport::{ScriptedSource, Step};
    use serde_json::json;

    use super::*;
    use crate::exit::{DATA_INVALID, USAGE};

    #[test]
    fn params_must_be_an_object() {
        assert!(parse_params(None).unwrap().is_empty());
        assert_eq!(
            parse_params(Some(r#"{"address":"0x400"}"#)).unwrap()["address"],
            json!("0x400")
        );
        assert_eq!(parse_params(Some("[1,2]")).unwrap_err().code, USAGE);
        assert_eq!(parse_params(Some("{nope")).unwrap_err().code, USAGE);
    }

    #[test]
    fn call_uses_explicit_id() {
        let mut conn = Connection::open(ScriptedSource::with_steps([Step::data(
            r#"{"id":9,"result":"done"}"#,
        )]));
        let resp = call(&mut conn, "reset", Params::new(), Some(9)).unwrap();
        assert_eq!(resp.id, 9);
        assert_eq!(conn.next_id(), 0);
    }

    #[test]
    fn mismatch_is_invalid_data() {
        let mut conn = Connection::open(ScriptedSource::with_steps([Step::data(
            r#"{"id":3,"result":"done"}"#,
        )]));
        let err = call(&mut conn, "reset", Params::new(), None).unwrap_err();
        assert_eq!(err.code, DATA_INVALID);
    }

    #[test]
    fn closed_connection_is_transport_error() {
        let mut conn: Connection<ScriptedSource> = Connection::closed();
        let err = call(&mut conn, "reset", Params::new(), None).unwrap_err();
        assert_eq!(err.code, TRANSPORT_ERROR);
    }
}
