mod encode;

use std::sync::Arc;

use bytes::Bytes;
use prost::Message as _;
use prost_reflect::MessageDescriptor;

use crate::value::Value;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("fixture list is empty")]
    EmptyFixtures,

    #[error("failed to build message {message}: {reason}")]
    Build { message: String, reason: String },

    #[error("payload generator failed: {0}")]
    Generator(String),
}

/// Identifies one dispatched call for payload generation purposes.
#[derive(Debug, Clone, Copy)]
pub struct CallSeed {
    /// Dispatch sequence number (1-based, globally unique).
    pub seq: u64,
    /// Worker id (1-based).
    pub worker: u64,
}

/// User-supplied payload generator, keyed by the call seed.
///
/// Called concurrently from every worker. The engine adds no locking around
/// it; a generator that keeps internal state must make that state safe to
/// share on its own.
pub type GeneratorFn =
    Arc<dyn Fn(&CallSeed) -> std::result::Result<Value, String> + Send + Sync + 'static>;

/// Where request payloads come from.
pub enum MessageSource {
    /// One template, reused for every call.
    Static(Value),
    /// Indexed list; call `seq` selects entry `seq % len`. A streaming call
    /// sends one pass over the whole list.
    Fixtures(Vec<Value>),
    /// Closure invoked per message.
    Generator(GeneratorFn),
}

enum Plan {
    Static(Bytes),
    Fixtures(Arc<[Bytes]>),
    Generator(GeneratorFn),
}

/// Builds wire-ready request payloads for one method's input type.
///
/// Static and fixture payloads are encoded once up front, so template/type
/// errors surface as configuration errors before any call is dispatched.
/// Safe to share across workers; the only state is read-only.
pub struct MessageBuilder {
    input: MessageDescriptor,
    plan: Plan,
}

impl MessageBuilder {
    pub fn new(input: MessageDescriptor, source: MessageSource) -> Result<Self> {
        let plan = match source {
            MessageSource::Static(template) => {
                Plan::Static(encode_one(&input, &template)?)
            }
            MessageSource::Fixtures(items) => {
                if items.is_empty() {
                    return Err(Error::EmptyFixtures);
                }

                let mut encoded = Vec::with_capacity(items.len());
                for item in &items {
                    encoded.push(encode_one(&input, item)?);
                }
                Plan::Fixtures(Arc::from(encoded.into_boxed_slice()))
            }
            MessageSource::Generator(generator) => Plan::Generator(generator),
        };

        Ok(Self { input, plan })
    }

    #[must_use]
    pub fn input(&self) -> &MessageDescriptor {
        &self.input
    }

    /// Produces the payload for one unary or server-streaming call.
    pub fn next(&self, seed: &CallSeed) -> Result<Bytes> {
        match &self.plan {
            Plan::Static(bytes) => Ok(bytes.clone()),
            Plan::Fixtures(items) => {
                // Sequence numbers are 1-based; index from zero so fixture 0
                // is the first one sent.
                let idx = (seed.seq.wrapping_sub(1) as usize) % items.len();
                Ok(items[idx].clone())
            }
            Plan::Generator(generator) => {
                let value = generator(seed).map_err(Error::Generator)?;
                encode_one(&self.input, &value)
            }
        }
    }

    /// Produces the send-side payloads for one client/bidi streaming call.
    ///
    /// A fixture source contributes one pass over the list; static and
    /// generator sources contribute `budget` messages (default 1).
    pub fn stream_batch(&self, seed: &CallSeed, budget: Option<usize>) -> Result<Vec<Bytes>> {
        match &self.plan {
            Plan::Static(bytes) => {
                let n = budget.unwrap_or(1).max(1);
                Ok(vec![bytes.clone(); n])
            }
            Plan::Fixtures(items) => {
                let n = match budget {
                    Some(b) => b.max(1).min(items.len()),
                    None => items.len(),
                };
                Ok(items.iter().take(n).cloned().collect())
            }
            Plan::Generator(generator) => {
                let n = budget.unwrap_or(1).max(1);
                let mut out = Vec::with_capacity(n);
                for _ in 0..n {
                    let value = generator(seed).map_err(Error::Generator)?;
                    out.push(encode_one(&self.input, &value)?);
                }
                Ok(out)
            }
        }
    }
}

fn encode_one(desc: &MessageDescriptor, value: &Value) -> Result<Bytes> {
    let msg = encode::to_message(desc, value).map_err(|reason| Error::Build {
        message: desc.full_name().to_string(),
        reason,
    })?;

    Ok(Bytes::from(msg.encode_to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost_reflect::{DescriptorPool, DynamicMessage, ReflectMessage};

    fn sample_pool() -> DescriptorPool {
        use prost_types::field_descriptor_proto::{Label, Type};
        use prost_types::{
            DescriptorProto, EnumDescriptorProto, EnumValueDescriptorProto, FieldDescriptorProto,
            FileDescriptorProto, FileDescriptorSet,
        };

        fn field(name: &str, number: i32, ty: Type, label: Label) -> FieldDescriptorProto {
            FieldDescriptorProto {
                name: Some(name.to_string()),
                number: Some(number),
                r#type: Some(ty as i32),
                label: Some(label as i32),
                ..Default::default()
            }
        }

        let mut level = field("level", 6, Type::Enum, Label::Optional);
        level.type_name = Some(".bench.Level".to_string());

        let mut nested = field("inner", 7, Type::Message, Label::Optional);
        nested.type_name = Some(".bench.Inner".to_string());

        let file = FileDescriptorProto {
            name: Some("bench.proto".to_string()),
            package: Some("bench".to_string()),
            syntax: Some("proto3".to_string()),
            enum_type: vec![EnumDescriptorProto {
                name: Some("Level".to_string()),
                value: vec![
                    EnumValueDescriptorProto {
                        name: Some("LOW".to_string()),
                        number: Some(0),
                        ..Default::default()
                    },
                    EnumValueDescriptorProto {
                        name: Some("HIGH".to_string()),
                        number: Some(3),
                        ..Default::default()
                    },
                ],
                ..Default::default()
            }],
            message_type: vec![
                DescriptorProto {
                    name: Some("Ping".to_string()),
                    field: vec![
                        field("name", 1, Type::String, Label::Optional),
                        field("count", 2, Type::Int64, Label::Optional),
                        field("ratio", 3, Type::Double, Label::Optional),
                        field("tags", 4, Type::String, Label::Repeated),
                        field("ready", 5, Type::Bool, Label::Optional),
                        level,
                        nested,
                    ],
                    ..Default::default()
                },
                DescriptorProto {
                    name: Some("Inner".to_string()),
                    field: vec![field("id", 1, Type::Uint32, Label::Optional)],
                    ..Default::default()
                },
            ],
            ..Default::default()
        };

        DescriptorPool::from_file_descriptor_set(FileDescriptorSet { file: vec![file] })
            .unwrap_or_else(|err| panic!("failed to build descriptor pool: {err}"))
    }

    fn ping_desc() -> MessageDescriptor {
        sample_pool()
            .get_message_by_name("bench.Ping")
            .unwrap_or_else(|| panic!("bench.Ping not in pool"))
    }

    fn decode(desc: &MessageDescriptor, bytes: &Bytes) -> DynamicMessage {
        DynamicMessage::decode(desc.clone(), bytes.as_ref())
            .unwrap_or_else(|err| panic!("decode: {err}"))
    }

    fn get_str(msg: &DynamicMessage, name: &str) -> String {
        let field = msg
            .descriptor()
            .get_field_by_name(name)
            .unwrap_or_else(|| panic!("no field {name}"));
        msg.get_field(&field)
            .as_str()
            .unwrap_or_else(|| panic!("field {name} is not a string"))
            .to_string()
    }

    #[test]
    fn static_template_encodes_once_and_round_trips() {
        let desc = ping_desc();
        let template = Value::object([
            ("name", Value::str("warmup")),
            ("count", Value::I64(42)),
            ("ratio", Value::F64(0.5)),
            ("ready", Value::Bool(true)),
            (
                "tags",
                Value::Array(vec![Value::str("a"), Value::str("b")]),
            ),
        ]);

        let builder = MessageBuilder::new(desc.clone(), MessageSource::Static(template))
            .unwrap_or_else(|err| panic!("builder: {err}"));

        let seed = CallSeed { seq: 1, worker: 1 };
        let bytes = builder.next(&seed).unwrap_or_else(|err| panic!("{err}"));
        let msg = decode(&desc, &bytes);

        assert_eq!(get_str(&msg, "name"), "warmup");

        let count = msg
            .descriptor()
            .get_field_by_name("count")
            .unwrap_or_else(|| panic!("no count"));
        assert_eq!(msg.get_field(&count).as_i64(), Some(42));

        // Same payload for every seed.
        let again = builder
            .next(&CallSeed { seq: 99, worker: 3 })
            .unwrap_or_else(|err| panic!("{err}"));
        assert_eq!(bytes, again);
    }

    #[test]
    fn fixtures_cycle_by_sequence_number() {
        let desc = ping_desc();
        let fixtures = vec![
            Value::object([("name", Value::str("one"))]),
            Value::object([("name", Value::str("two"))]),
            Value::object([("name", Value::str("three"))]),
        ];

        let builder = MessageBuilder::new(desc.clone(), MessageSource::Fixtures(fixtures))
            .unwrap_or_else(|err| panic!("builder: {err}"));

        let name_at = |seq: u64| {
            let bytes = builder
                .next(&CallSeed { seq, worker: 1 })
                .unwrap_or_else(|err| panic!("{err}"));
            get_str(&decode(&desc, &bytes), "name")
        };

        assert_eq!(name_at(1), "one");
        assert_eq!(name_at(2), "two");
        assert_eq!(name_at(3), "three");
        assert_eq!(name_at(4), "one");
    }

    #[test]
    fn fixture_stream_batch_is_one_pass() {
        let desc = ping_desc();
        let fixtures = vec![
            Value::object([("name", Value::str("one"))]),
            Value::object([("name", Value::str("two"))]),
        ];

        let builder = MessageBuilder::new(desc, MessageSource::Fixtures(fixtures))
            .unwrap_or_else(|err| panic!("builder: {err}"));

        let seed = CallSeed { seq: 1, worker: 1 };
        let batch = builder
            .stream_batch(&seed, None)
            .unwrap_or_else(|err| panic!("{err}"));
        assert_eq!(batch.len(), 2);

        let capped = builder
            .stream_batch(&seed, Some(1))
            .unwrap_or_else(|err| panic!("{err}"));
        assert_eq!(capped.len(), 1);
    }

    #[test]
    fn generator_is_keyed_by_seed() {
        let desc = ping_desc();
        let generator: GeneratorFn = Arc::new(|seed| {
            Ok(Value::object([(
                "name",
                Value::String(format!("call-{}-{}", seed.seq, seed.worker).into()),
            )]))
        });

        let builder = MessageBuilder::new(desc.clone(), MessageSource::Generator(generator))
            .unwrap_or_else(|err| panic!("builder: {err}"));

        let bytes = builder
            .next(&CallSeed { seq: 7, worker: 2 })
            .unwrap_or_else(|err| panic!("{err}"));
        assert_eq!(get_str(&decode(&desc, &bytes), "name"), "call-7-2");
    }

    #[test]
    fn generator_errors_are_fatal() {
        let desc = ping_desc();
        let generator: GeneratorFn = Arc::new(|_| Err("boom".to_string()));

        let builder = MessageBuilder::new(desc, MessageSource::Generator(generator))
            .unwrap_or_else(|err| panic!("builder: {err}"));

        let err = match builder.next(&CallSeed { seq: 1, worker: 1 }) {
            Ok(_) => panic!("generator error should propagate"),
            Err(err) => err,
        };
        assert!(matches!(err, Error::Generator(_)));
    }

    #[test]
    fn bad_templates_fail_at_construction() {
        let desc = ping_desc();

        let build_err = |source: MessageSource| match MessageBuilder::new(desc.clone(), source) {
            Ok(_) => panic!("bad template should fail at construction"),
            Err(err) => err,
        };

        // Unknown field.
        let err = build_err(MessageSource::Static(Value::object([(
            "nope",
            Value::I64(1),
        )])));
        assert!(matches!(err, Error::Build { .. }));

        // Type mismatch: array into a scalar field.
        let err = build_err(MessageSource::Static(Value::object([(
            "count",
            Value::Array(vec![]),
        )])));
        assert!(matches!(err, Error::Build { .. }));

        // Non-object template.
        let err = build_err(MessageSource::Static(Value::I64(5)));
        assert!(matches!(err, Error::Build { .. }));

        // Empty fixture list.
        let err = build_err(MessageSource::Fixtures(Vec::new()));
        assert!(matches!(err, Error::EmptyFixtures));
    }

    #[test]
    fn enums_and_nested_messages_encode() {
        let desc = ping_desc();
        let template = Value::object([
            ("level", Value::str("HIGH")),
            ("inner", Value::object([("id", Value::U64(9))])),
        ]);

        let builder = MessageBuilder::new(desc.clone(), MessageSource::Static(template))
            .unwrap_or_else(|err| panic!("builder: {err}"));
        let bytes = builder
            .next(&CallSeed { seq: 1, worker: 1 })
            .unwrap_or_else(|err| panic!("{err}"));
        let msg = decode(&desc, &bytes);

        let level = msg
            .descriptor()
            .get_field_by_name("level")
            .unwrap_or_else(|| panic!("no level"));
        assert_eq!(msg.get_field(&level).as_enum_number(), Some(3));
    }
}
