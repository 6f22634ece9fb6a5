// ABOUTME: End-to-end graph tests: identity, cycles, collection shapes and error paths.
// ABOUTME: Exercises only the public API, the way a consumer of the crate would.

use graphcodec::{
    decode, decode_as, decode_with_config, encode, encode_as, encode_with_config, handle,
    record_schema, skip, Error, ObjectRef, ReaderConfig, Registry, TypeDesc, Value, WriterConfig,
};

fn registry() -> Registry {
    let mut builder = Registry::builder();
    builder
        .register_record(record_schema!(Node { value: "i32", next: "Node" }).unwrap())
        .unwrap();
    builder
        .register_record(record_schema!(Pair { left: "object", right: "object" }).unwrap())
        .unwrap();
    builder
        .register_record(
            record_schema!(Graph {
                name: "string",
                nodes: "List<Node>",
                index: "Dictionary<string,Node>",
                weights: "f64?[]",
                kind: "type",
            })
            .unwrap(),
        )
        .unwrap();
    builder.build().unwrap()
}

fn record(registry: &Registry, name: &str, fields: &[(&str, Value)]) -> ObjectRef {
    let obj = registry.new_record(name).unwrap();
    {
        let mut object = obj.borrow_mut();
        let record = object.as_record_mut().unwrap();
        for (field, value) in fields {
            record.set(field, value.clone()).unwrap();
        }
    }
    obj
}

fn field(obj: &ObjectRef, name: &str) -> Value {
    obj.borrow().as_record().unwrap().get(name).unwrap().clone()
}

fn array_items(value: &Value) -> Vec<Value> {
    value.as_object().unwrap().borrow().as_array().unwrap().items.clone()
}

fn roundtrip(registry: &Registry, value: &Value) -> Value {
    let bytes = encode(registry, value).unwrap();
    skip(registry, &bytes).unwrap();
    decode(registry, &bytes).unwrap()
}

// =============================================================================
// Identity and cycles
// =============================================================================

#[test]
fn test_direct_self_cycle() {
    let registry = registry();
    let a = record(&registry, "Node", &[("value", Value::I32(1))]);
    a.borrow_mut().as_record_mut().unwrap().set("next", a.clone()).unwrap();

    let bytes = encode(&registry, &Value::Object(a)).unwrap();
    // [Node handle][cookie 0][value 1][back-reference 0]
    let node = registry.handle_for(&TypeDesc::record("Node")).unwrap();
    let mut expected = node.to_le_bytes().to_vec();
    for n in [0i32, 1, 0] {
        expected.extend_from_slice(&n.to_le_bytes());
    }
    assert_eq!(bytes, expected);

    let b = decode(&registry, &bytes).unwrap();
    let b = b.as_object().unwrap();
    assert_eq!(field(b, "value"), Value::I32(1));
    assert!(field(b, "next").as_object().unwrap().ptr_eq(b));
}

#[test]
fn test_indirect_cycle() {
    let registry = registry();
    let a = record(&registry, "Node", &[("value", Value::I32(1))]);
    let b = record(&registry, "Node", &[("value", Value::I32(2)), ("next", Value::Object(a.clone()))]);
    a.borrow_mut().as_record_mut().unwrap().set("next", b).unwrap();

    let decoded = roundtrip(&registry, &Value::Object(a));
    let a2 = decoded.as_object().unwrap();
    let b2 = field(a2, "next");
    let b2 = b2.as_object().unwrap();
    assert!(!a2.ptr_eq(b2));
    assert_eq!(field(b2, "value"), Value::I32(2));
    assert!(field(b2, "next").as_object().unwrap().ptr_eq(a2));
}

#[test]
fn test_shared_reference_decodes_to_one_instance() {
    let registry = registry();
    let shared = record(&registry, "Node", &[("value", Value::I32(7))]);
    let pair = record(
        &registry,
        "Pair",
        &[("left", Value::Object(shared.clone())), ("right", Value::Object(shared))],
    );

    let decoded = roundtrip(&registry, &Value::Object(pair));
    let pair = decoded.as_object().unwrap();
    let left = field(pair, "left");
    let right = field(pair, "right");
    assert!(left.as_object().unwrap().ptr_eq(right.as_object().unwrap()));

    // Mutation through one path is visible through the other.
    left.as_object()
        .unwrap()
        .borrow_mut()
        .as_record_mut()
        .unwrap()
        .set("value", 8)
        .unwrap();
    assert_eq!(field(right.as_object().unwrap(), "value"), Value::I32(8));
}

#[test]
fn test_identity_across_containers() {
    let registry = registry();
    let n1 = record(&registry, "Node", &[("value", Value::I32(1))]);
    let n2 = record(&registry, "Node", &[("value", Value::I32(2)), ("next", Value::Object(n1.clone()))]);
    let nodes = ObjectRef::list(
        TypeDesc::record("Node"),
        vec![Value::Object(n1.clone()), Value::Object(n2.clone())],
    );
    let index = ObjectRef::dictionary(
        TypeDesc::String,
        TypeDesc::record("Node"),
        vec![("one".into(), Value::Object(n1)), ("two".into(), Value::Object(n2))],
    );
    let weights = ObjectRef::array(
        TypeDesc::nullable(TypeDesc::F64),
        vec![Value::F64(0.5), Value::Null, Value::F64(2.0)],
    );
    let graph = record(
        &registry,
        "Graph",
        &[
            ("name", "g".into()),
            ("nodes", Value::Object(nodes)),
            ("index", Value::Object(index)),
            ("weights", Value::Object(weights)),
            ("kind", Value::Type("Dictionary<string,Node>".parse().unwrap())),
        ],
    );

    let decoded = roundtrip(&registry, &Value::Object(graph));
    let graph = decoded.as_object().unwrap();
    assert_eq!(field(graph, "name"), Value::from("g"));
    assert_eq!(field(graph, "kind"), Value::Type("Dictionary<string,Node>".parse().unwrap()));

    let nodes = field(graph, "nodes");
    let nodes = nodes.as_object().unwrap().borrow();
    let nodes = &nodes.as_list().unwrap().items;
    let index = field(graph, "index");
    let index = index.as_object().unwrap().borrow();
    let index = index.as_dictionary().unwrap();

    let one = index.get(&"one".into()).unwrap();
    let two = index.get(&"two".into()).unwrap();
    assert!(one.as_object().unwrap().ptr_eq(nodes[0].as_object().unwrap()));
    assert!(two.as_object().unwrap().ptr_eq(nodes[1].as_object().unwrap()));
    assert!(field(two.as_object().unwrap(), "next").as_object().unwrap().ptr_eq(one.as_object().unwrap()));

    assert_eq!(
        array_items(&field(graph, "weights")),
        vec![Value::F64(0.5), Value::Null, Value::F64(2.0)]
    );
}

#[test]
fn test_shared_jagged_rows() {
    let registry = registry();
    let row = ObjectRef::array(TypeDesc::I32, vec![Value::I32(1), Value::I32(2)]);
    let grid = ObjectRef::array(
        TypeDesc::array(TypeDesc::I32),
        vec![Value::Object(row.clone()), Value::Null, Value::Object(row)],
    );

    let decoded = roundtrip(&registry, &Value::Object(grid));
    assert_eq!(decoded.runtime_type(), Some("i32[][]".parse().unwrap()));
    let rows = array_items(&decoded);
    assert!(rows[1].is_null());
    assert!(rows[0].as_object().unwrap().ptr_eq(rows[2].as_object().unwrap()));
    assert_eq!(array_items(&rows[0]), vec![Value::I32(1), Value::I32(2)]);
}

#[test]
fn test_dictionary_with_object_keys() {
    let registry = registry();
    let key = record(&registry, "Node", &[("value", Value::I32(3))]);
    let dict = ObjectRef::dictionary(
        TypeDesc::record("Node"),
        TypeDesc::Object,
        vec![(Value::Object(key.clone()), Value::Object(key))],
    );

    let decoded = roundtrip(&registry, &Value::Object(dict));
    let decoded = decoded.as_object().unwrap().borrow();
    let (k, v) = &decoded.as_dictionary().unwrap().entries[0];
    assert!(k.as_object().unwrap().ptr_eq(v.as_object().unwrap()));
}

// =============================================================================
// Array shapes
// =============================================================================

#[test]
fn test_string_array_keeps_null_slot() {
    let registry = registry();
    let items = vec![Value::from("x"), Value::Null, Value::from("y")];
    let arr = Value::Object(ObjectRef::array(TypeDesc::String, items.clone()));

    let bytes = encode(&registry, &arr).unwrap();
    assert_eq!(&bytes[..4], &[handle::ARRAY as u8, 0, handle::STRING as u8, 0]);
    let decoded = decode(&registry, &bytes).unwrap();
    assert_eq!(decoded.runtime_type(), Some(TypeDesc::array(TypeDesc::String)));
    assert_eq!(array_items(&decoded), items);

    let declared = TypeDesc::array(TypeDesc::String);
    let bare = encode_as(&registry, &arr, &declared).unwrap();
    assert_eq!(bare.len() + 4, bytes.len());
    assert_eq!(array_items(&decode_as(&registry, &bare, &declared).unwrap()), items);
}

#[test]
fn test_sparse_nullable_array() {
    let registry = registry();
    let mut items = vec![Value::Null; 100];
    items[3] = Value::I32(5);
    items[77] = Value::I32(9);
    let arr = Value::Object(ObjectRef::array(TypeDesc::nullable(TypeDesc::I32), items));

    let bytes = encode(&registry, &arr).unwrap();
    // tag, cookie, element handle, length, two index/value pairs, terminator
    assert_eq!(bytes.len(), 2 + 4 + 2 + 4 + 2 * 8 + 4);

    let decoded = array_items(&decode(&registry, &bytes).unwrap());
    assert_eq!(decoded.len(), 100);
    for (i, item) in decoded.iter().enumerate() {
        match i {
            3 => assert_eq!(item, &Value::I32(5)),
            77 => assert_eq!(item, &Value::I32(9)),
            _ => assert!(item.is_null(), "slot {i} should be null"),
        }
    }
}

#[test]
fn test_sparse_payload_independent_of_length() {
    let registry = registry();
    let encoded_len = |len: usize| {
        let mut items = vec![Value::Null; len];
        items[1] = Value::U8(1);
        items[len - 1] = Value::U8(2);
        let arr = Value::Object(ObjectRef::array(TypeDesc::nullable(TypeDesc::U8), items));
        encode(&registry, &arr).unwrap().len()
    };
    assert_eq!(encoded_len(10), encoded_len(10_000));
}

#[test]
fn test_mixed_object_array_keeps_concrete_types() {
    let registry = registry();
    let items = vec![Value::I32(1), Value::from("a"), Value::I32(2)];
    let arr = Value::Object(ObjectRef::array(TypeDesc::Object, items.clone()));

    let decoded = array_items(&roundtrip(&registry, &arr));
    assert_eq!(decoded, items);
    assert_eq!(decoded[0].runtime_type(), Some(TypeDesc::I32));
    assert_eq!(decoded[1].runtime_type(), Some(TypeDesc::String));
}

#[test]
fn test_homogeneous_object_array_writes_one_handle() {
    let registry = registry();
    for n in [1usize, 10, 100] {
        let items: Vec<Value> = (0..n as i32).map(Value::I32).collect();
        let arr = Value::Object(ObjectRef::array(TypeDesc::Object, items.clone()));
        let bytes = encode(&registry, &arr).unwrap();
        // root tag, cookie, length, one element tag, then raw elements
        assert_eq!(bytes.len(), 2 + 4 + 4 + 2 + 4 * n);
        assert_eq!(array_items(&decode(&registry, &bytes).unwrap()), items);
    }
}

#[test]
fn test_homogeneous_record_array() {
    let registry = registry();
    let a = record(&registry, "Node", &[("value", Value::I32(1))]);
    let b = record(&registry, "Node", &[("value", Value::I32(2))]);
    let items = vec![Value::Object(a.clone()), Value::Null, Value::Object(b), Value::Object(a)];
    let arr = Value::Object(ObjectRef::array(TypeDesc::Object, items));

    let decoded = array_items(&roundtrip(&registry, &arr));
    assert!(decoded[1].is_null());
    assert!(decoded[0].as_object().unwrap().ptr_eq(decoded[3].as_object().unwrap()));
    assert_eq!(field(decoded[2].as_object().unwrap(), "value"), Value::I32(2));
}

#[test]
fn test_empty_containers() {
    let registry = registry();
    for value in [
        ObjectRef::array(TypeDesc::Object, Vec::new()),
        ObjectRef::array(TypeDesc::I64, Vec::new()),
        ObjectRef::array(TypeDesc::nullable(TypeDesc::Bool), Vec::new()),
        ObjectRef::list(TypeDesc::String, Vec::new()),
        ObjectRef::dictionary(TypeDesc::I32, TypeDesc::Object, Vec::new()),
    ] {
        let ty = value.runtime_type();
        let decoded = roundtrip(&registry, &Value::Object(value));
        assert_eq!(decoded.runtime_type(), Some(ty));
    }
}

// =============================================================================
// Registry agreement
// =============================================================================

#[test]
fn test_independent_registries_agree() {
    let a = registry();
    let b = registry();
    let node = record(&a, "Node", &[("value", Value::I32(4))]);
    let list = Value::Object(ObjectRef::list(TypeDesc::record("Node"), vec![Value::Object(node)]));

    let bytes_a = encode(&a, &list).unwrap();
    let bytes_b = encode(&b, &list).unwrap();
    assert_eq!(bytes_a, bytes_b);

    let decoded = decode(&b, &bytes_a).unwrap();
    let decoded = decoded.as_object().unwrap().borrow();
    let first = decoded.as_list().unwrap().items[0].clone();
    assert_eq!(field(first.as_object().unwrap(), "value"), Value::I32(4));
}

#[test]
fn test_mismatched_registry_is_rejected() {
    let writer = registry();
    let mut builder = Registry::builder();
    builder
        .register_record(record_schema!(Pair { left: "object", right: "object" }).unwrap())
        .unwrap();
    let reader = builder.build().unwrap();

    let node = record(&writer, "Node", &[("value", Value::I32(4))]);
    let bytes = encode(&writer, &Value::Object(node)).unwrap();
    // The writer's Node handle is the reader's Pair handle; the reader's
    // Pair codec consumes Node bytes as polymorphic slots and fails.
    assert!(decode(&reader, &bytes).is_err());

    let graph = record(&writer, "Graph", &[]);
    let bytes = encode(&writer, &Value::Object(graph)).unwrap();
    let err = decode(&reader, &bytes).unwrap_err();
    assert!(err.is_registry_mismatch(), "unexpected error {err}");
}

#[test]
fn test_unregistered_type_rejected_before_writing() {
    let registry = Registry::builder().build().unwrap();
    let list = Value::Object(ObjectRef::list(TypeDesc::record("Node"), Vec::new()));
    assert!(matches!(encode(&registry, &list), Err(Error::UnregisteredType(_))));
}

// =============================================================================
// Corrupt input and limits
// =============================================================================

#[test]
fn test_out_of_order_cookie() {
    let registry = registry();
    let a = record(&registry, "Node", &[("value", Value::I32(1))]);
    a.borrow_mut().as_record_mut().unwrap().set("next", a.clone()).unwrap();
    let mut bytes = encode(&registry, &Value::Object(a)).unwrap();
    bytes[10..14].copy_from_slice(&5i32.to_le_bytes());
    assert!(matches!(decode(&registry, &bytes), Err(Error::InvalidCookie(5))));
}

#[test]
fn test_wrong_type_in_declared_slot() {
    let registry = registry();
    let pair = record(&registry, "Pair", &[]);
    let node = record(&registry, "Node", &[("next", Value::Object(pair))]);
    assert!(matches!(
        encode(&registry, &Value::Object(node)),
        Err(Error::TypeMismatch { .. })
    ));
}

#[test]
fn test_depth_limit() {
    let registry = registry();
    let mut head = record(&registry, "Node", &[]);
    for i in 0..10 {
        head = record(&registry, "Node", &[("value", Value::I32(i)), ("next", Value::Object(head))]);
    }
    let bytes = encode(&registry, &Value::Object(head)).unwrap();

    let config = ReaderConfig {
        max_depth: 5,
        ..ReaderConfig::default()
    };
    assert!(matches!(
        decode_with_config(&registry, &bytes, config),
        Err(Error::MaxDepthExceeded)
    ));
    decode(&registry, &bytes).unwrap();
}

#[test]
fn test_collection_limit() {
    let registry = registry();
    let arr = ObjectRef::array(TypeDesc::U8, vec![Value::U8(0); 16]);
    let bytes = encode(&registry, &Value::Object(arr)).unwrap();
    let config = ReaderConfig {
        max_collection_len: 8,
        ..ReaderConfig::default()
    };
    assert!(matches!(
        decode_with_config(&registry, &bytes, config),
        Err(Error::MaxCollectionSizeExceeded)
    ));
}

#[test]
fn test_back_reference_must_fit_declared_slot() {
    let mut builder = Registry::builder();
    builder
        .register_record(record_schema!(Holder { any: "object", names: "List<string>" }).unwrap())
        .unwrap();
    let registry = builder.build().unwrap();

    // Written first through the open slot, then referenced from a List<string> slot.
    let ints = Value::Object(ObjectRef::list(TypeDesc::I32, vec![Value::I32(1)]));
    let holder = record(&registry, "Holder", &[("any", ints.clone()), ("names", ints)]);
    let err = encode(&registry, &Value::Object(holder)).unwrap_err();
    assert!(
        matches!(err, Error::TypeMismatch { ref expected, .. } if expected == "List<string>"),
        "unexpected error {err}"
    );
}

#[test]
fn test_array_lengths_bounded_by_input() {
    let registry = registry();

    // Eight nested object[] headers, each claiming a million elements.
    let mut bytes = handle::OBJECT_ARRAY.to_le_bytes().to_vec();
    for cookie in 0..8i32 {
        bytes.extend_from_slice(&cookie.to_le_bytes());
        bytes.extend_from_slice(&1_000_000i32.to_le_bytes());
        bytes.extend_from_slice(&handle::OBJECT.to_le_bytes());
        bytes.extend_from_slice(&handle::OBJECT_ARRAY.to_le_bytes());
    }
    assert_eq!(bytes.len(), 98);
    assert!(matches!(decode(&registry, &bytes), Err(Error::Truncated)));

    // One byte per element is exactly enough.
    let flags = Value::Object(ObjectRef::array(TypeDesc::Bool, vec![Value::Bool(true); 64]));
    assert_eq!(array_items(&roundtrip(&registry, &flags)), vec![Value::Bool(true); 64]);
}

#[test]
fn test_sparse_slots_budgeted_across_decode() {
    let registry = registry();
    let sparse = || {
        let mut items = vec![Value::Null; 30];
        items[7] = Value::I32(7);
        Value::Object(ObjectRef::array(TypeDesc::nullable(TypeDesc::I32), items))
    };
    let pair = Value::Object(ObjectRef::array(TypeDesc::Object, vec![sparse(), sparse()]));
    let bytes = encode(&registry, &pair).unwrap();

    let config = |max_sparse_slots| ReaderConfig {
        max_sparse_slots,
        ..ReaderConfig::default()
    };
    assert!(matches!(
        decode_with_config(&registry, &bytes, config(50)),
        Err(Error::MaxCollectionSizeExceeded)
    ));
    let decoded = decode_with_config(&registry, &bytes, config(60)).unwrap();
    assert_eq!(array_items(&array_items(&decoded)[1])[7], Value::I32(7));
}

#[test]
fn test_long_chain_with_raised_limits() {
    // Encoding and decoding recurse once per node.
    let worker = std::thread::Builder::new().stack_size(64 << 20).spawn(|| {
        let registry = registry();
        let mut head = record(&registry, "Node", &[("value", Value::I32(0))]);
        for i in 1..600 {
            head = record(&registry, "Node", &[("value", Value::I32(i)), ("next", Value::Object(head))]);
        }
        let root = Value::Object(head);

        assert!(matches!(encode(&registry, &root), Err(Error::MaxDepthExceeded)));
        let bytes = encode_with_config(&registry, &root, WriterConfig { max_depth: 1024 }).unwrap();

        assert!(matches!(decode(&registry, &bytes), Err(Error::MaxDepthExceeded)));
        let config = ReaderConfig {
            max_depth: 1024,
            ..ReaderConfig::default()
        };
        let decoded = decode_with_config(&registry, &bytes, config).unwrap();

        let mut len = 0;
        let mut cursor = decoded;
        while let Some(node) = cursor.as_object().cloned() {
            len += 1;
            cursor = field(&node, "next");
        }
        assert_eq!(len, 600);
    });
    worker.unwrap().join().unwrap();
}
