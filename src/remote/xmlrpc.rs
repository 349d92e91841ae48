//! A minimal XML-RPC client: `methodCall` encoding and a nom decoder for
//! `methodResponse` documents.
use std::fmt::Write;

use indexmap::IndexMap;
use nom::{
    branch::alt,
    bytes::complete::{tag, take_until},
    character::complete::multispace0,
    combinator::{all_consuming, map, map_res, opt, value as constant},
    multi::many0,
    sequence::{delimited, preceded, terminated, tuple},
    IResult,
};
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use crate::{
    error::{EvalError, TransportError},
    value::{Key, Value},
};

type XmlResult<'a, T> = IResult<&'a str, T>;

/// A connection to one XML-RPC endpoint
#[derive(Debug)]
pub struct Client {
    url: String,
    http: reqwest::blocking::Client,
}

impl Client {
    /// `url` is a plain `http(s)://` URL, see [`super::endpoint_url`]
    pub fn new(url: &str) -> Result<Self, TransportError> {
        let http = reqwest::blocking::Client::builder()
            .build()
            .map_err(TransportError::from)?;
        Ok(Self {
            url: url.to_string(),
            http,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn call(&self, method: &str, params: &[Value]) -> Result<Value, EvalError> {
        let body = encode_call(method, params)?;
        debug!(url = %self.url, method, "xml-rpc call");
        let response = self
            .http
            .post(&self.url)
            .header(CONTENT_TYPE, "text/xml")
            .body(body)
            .send()
            .map_err(TransportError::from)?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                url: self.url.clone(),
                status: status.as_u16(),
            }
            .into());
        }
        let text = response.text().map_err(TransportError::from)?;
        Ok(decode_response(&text)?)
    }
}

pub fn encode_call(method: &str, params: &[Value]) -> Result<String, EvalError> {
    let mut out = String::from("<?xml version=\"1.0\"?>\n<methodCall><methodName>");
    escape_into(&mut out, method);
    out.push_str("</methodName><params>");
    for param in params {
        out.push_str("<param>");
        encode_value(&mut out, param)?;
        out.push_str("</param>");
    }
    out.push_str("</params></methodCall>\n");
    Ok(out)
}

fn encode_value(out: &mut String, v: &Value) -> Result<(), EvalError> {
    out.push_str("<value>");
    match v {
        Value::None => out.push_str("<nil/>"),
        Value::Bool(b) => {
            let _ = write!(out, "<boolean>{}</boolean>", *b as u8);
        }
        Value::Int(i) if i32::try_from(*i).is_ok() => {
            let _ = write!(out, "<int>{i}</int>");
        }
        Value::Int(i) => {
            let _ = write!(out, "<i8>{i}</i8>");
        }
        Value::Float(x) => {
            let _ = write!(out, "<double>{x:?}</double>");
        }
        Value::Str(s) => {
            out.push_str("<string>");
            escape_into(out, s);
            out.push_str("</string>");
        }
        Value::List(xs) | Value::Tuple(xs) => {
            out.push_str("<array><data>");
            for x in xs.iter() {
                encode_value(out, x)?;
            }
            out.push_str("</data></array>");
        }
        Value::Dict(d) => {
            out.push_str("<struct>");
            for (k, v) in d.iter() {
                out.push_str("<member><name>");
                escape_into(out, &k.value().to_string());
                out.push_str("</name>");
                encode_value(out, v)?;
                out.push_str("</member>");
            }
            out.push_str("</struct>");
        }
        v => {
            return Err(EvalError::type_error(format!(
                "cannot marshal {} objects",
                v.type_name()
            )))
        }
    }
    out.push_str("</value>");
    Ok(())
}

fn escape_into(out: &mut String, s: &str) {
    for c in s.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            c => out.push(c),
        }
    }
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let Some(semi) = rest.find(';') else { break };
        let entity = &rest[1..semi];
        let decoded = match entity {
            "lt" => Some('<'),
            "gt" => Some('>'),
            "amp" => Some('&'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix("#x")
                .map(|hex| u32::from_str_radix(hex, 16))
                .or_else(|| entity.strip_prefix('#').map(str::parse::<u32>))
                .and_then(Result::ok)
                .and_then(char::from_u32),
        };
        match decoded {
            Some(c) => {
                out.push(c);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn ws(i: &str) -> XmlResult<'_, &str> {
    multispace0(i)
}

fn text(i: &str) -> XmlResult<'_, String> {
    map(take_until("<"), unescape)(i)
}

/// `<name>inner</name>`
fn element<'a, O>(
    name: &'static str,
    mut inner: impl FnMut(&'a str) -> XmlResult<'a, O>,
) -> impl FnMut(&'a str) -> XmlResult<'a, O> {
    move |i| {
        let (i, _) = tuple((tag("<"), tag(name), tag(">")))(i)?;
        let (i, o) = inner(i)?;
        let (i, _) = tuple((tag("</"), tag(name), tag(">")))(i)?;
        Ok((i, o))
    }
}

fn typed(i: &str) -> XmlResult<'_, Value> {
    alt((
        constant(Value::None, alt((tag("<nil/>"), tag("<nil></nil>")))),
        map_res(element("boolean", text), |s| match s.trim() {
            "1" => Ok(Value::Bool(true)),
            "0" => Ok(Value::Bool(false)),
            _ => Err("boolean"),
        }),
        map_res(
            alt((element("int", text), element("i4", text), element("i8", text))),
            |s| s.trim().parse::<i64>().map(Value::Int),
        ),
        map_res(element("double", text), |s| {
            s.trim().parse::<f64>().map(Value::Float)
        }),
        map(element("string", text), Value::from),
        constant(Value::from(""), tag("<string/>")),
        array,
        structure,
        map(
            alt((element("dateTime.iso8601", text), element("base64", text))),
            Value::from,
        ),
    ))(i)
}

fn array(i: &str) -> XmlResult<'_, Value> {
    map(
        element(
            "array",
            delimited(
                ws,
                element("data", preceded(ws, many0(terminated(value, ws)))),
                ws,
            ),
        ),
        Value::list,
    )(i)
}

fn member(i: &str) -> XmlResult<'_, (String, Value)> {
    element(
        "member",
        map(
            tuple((ws, element("name", text), ws, value, ws)),
            |(_, name, _, v, _)| (name, v),
        ),
    )(i)
}

fn structure(i: &str) -> XmlResult<'_, Value> {
    map_res(
        element("struct", preceded(ws, many0(terminated(member, ws)))),
        |members| {
            let mut map = IndexMap::with_capacity(members.len());
            for (name, v) in members {
                map.insert(Key::new(Value::from(name))?, v);
            }
            Ok::<_, EvalError>(Value::dict(map))
        },
    )(i)
}

fn value(i: &str) -> XmlResult<'_, Value> {
    alt((
        constant(Value::from(""), tag("<value/>")),
        delimited(
            tag("<value>"),
            alt((delimited(ws, typed, ws), map(text, Value::from))),
            tag("</value>"),
        ),
    ))(i)
}

fn response(i: &str) -> XmlResult<'_, Result<Value, Value>> {
    let (i, _) = opt(delimited(tag("<?xml"), take_until("?>"), tag("?>")))(i)?;
    let (i, _) = ws(i)?;
    element(
        "methodResponse",
        delimited(
            ws,
            alt((
                map(
                    element(
                        "params",
                        delimited(ws, element("param", delimited(ws, value, ws)), ws),
                    ),
                    Ok,
                ),
                constant(Ok(Value::None), element("params", ws)),
                map(element("fault", delimited(ws, value, ws)), Err),
            )),
            ws,
        ),
    )(i)
}

pub fn decode_response(body: &str) -> Result<Value, TransportError> {
    let (_, decoded) = all_consuming(terminated(response, ws))(body.trim_start()).map_err(
        |e| match e {
            nom::Err::Error(e) | nom::Err::Failure(e) => TransportError::Malformed(format!(
                "{:?} at '{}'",
                e.code,
                e.input.chars().take(40).collect::<String>()
            )),
            nom::Err::Incomplete(_) => TransportError::Malformed("truncated document".into()),
        },
    )?;
    decoded.map_err(|fault| {
        let field = |name: &str| match &fault {
            Value::Dict(d) => Key::new(Value::from(name)).ok().and_then(|k| d.get(&k).cloned()),
            _ => None,
        };
        TransportError::Fault {
            code: field("faultCode").and_then(|v| v.as_int()).unwrap_or(0),
            message: field("faultString")
                .map(|v| v.to_string())
                .unwrap_or_else(|| fault.to_string()),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use expect_test::expect;

    #[test]
    fn clients_build_without_connecting() {
        let client = Client::new("http://127.0.0.1:1/RPC2").unwrap();
        assert_eq!(client.url(), "http://127.0.0.1:1/RPC2");
    }

    #[test]
    fn encodes_calls() {
        let body = encode_call(
            "add",
            &[
                Value::Int(1),
                Value::Int(1 << 40),
                Value::from("a<b"),
                Value::list(vec![Value::Bool(true), Value::None, Value::Float(2.5)]),
            ],
        )
        .unwrap();
        expect![[r#"
            <?xml version="1.0"?>
            <methodCall><methodName>add</methodName><params><param><value><int>1</int></value></param><param><value><i8>1099511627776</i8></value></param><param><value><string>a&lt;b</string></value></param><param><value><array><data><value><boolean>1</boolean></value><value><nil/></value><value><double>2.5</double></value></data></array></value></param></params></methodCall>
        "#]]
        .assert_eq(&body);
        assert!(matches!(
            encode_call("f", &[Value::Builtin(&crate::eval::builtins::BUILTINS[0])]),
            Err(EvalError::Type(_))
        ));
    }

    #[test]
    fn decodes_responses() {
        let body = r#"<?xml version="1.0"?>
<methodResponse>
  <params>
    <param>
      <value><array><data>
        <value><i4>42</i4></value>
        <value>plain &amp; simple</value>
        <value><struct>
          <member><name>ok</name><value><boolean>1</boolean></value></member>
          <member><name>pi</name><value><double>3.5</double></value></member>
        </struct></value>
        <value><string/></value>
        <value><nil/></value>
      </data></array></value>
    </param>
  </params>
</methodResponse>
"#;
        expect![[r#"[42, 'plain & simple', {'ok': True, 'pi': 3.5}, '', None]"#]]
            .assert_eq(&decode_response(body).unwrap().repr());
    }

    #[test]
    fn decodes_faults() {
        let body = "<methodResponse><fault><value><struct>\
            <member><name>faultCode</name><value><int>4</int></value></member>\
            <member><name>faultString</name><value><string>Too many parameters.</string></value></member>\
            </struct></value></fault></methodResponse>";
        assert_eq!(
            decode_response(body),
            Err(TransportError::Fault {
                code: 4,
                message: "Too many parameters.".into()
            })
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            decode_response("<html>nope</html>"),
            Err(TransportError::Malformed(_))
        ));
        assert!(matches!(
            decode_response("<methodResponse><params><param><value><int>x</int></value></param></params></methodResponse>"),
            Err(TransportError::Malformed(_))
        ));
    }

    #[test]
    fn unescapes_entities() {
        assert_eq!(unescape("&lt;a&gt; &#65;&#x42; &bogus; &"), "<a> AB &bogus; &");
    }
}
