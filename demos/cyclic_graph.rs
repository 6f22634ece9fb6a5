// ABOUTME: Encodes a small cyclic org chart, decodes it with an independently built registry,
// ABOUTME: and shows that shared objects come back as one instance.
// Run with: RUST_LOG=graphcodec=trace cargo run --example cyclic_graph

use graphcodec::{decode, encode, record_schema, ObjectRef, Registry, RegistryConfig, Result, TypeDesc, Value};
use tracing_subscriber::EnvFilter;

fn config() -> Result<RegistryConfig> {
    Ok(RegistryConfig::default()
        .record(record_schema!(Employee { name: "string", manager: "Employee", reports: "List<Employee>" })?)
        .ty("Employee[]".parse()?))
}

fn employee(registry: &Registry, name: &str) -> Result<ObjectRef> {
    let obj = registry.new_record("Employee")?;
    if let Some(record) = obj.borrow_mut().as_record_mut() {
        record.set("name", name)?;
        record.set("reports", ObjectRef::list(TypeDesc::record("Employee"), Vec::new()))?;
    }
    Ok(obj)
}

fn field(value: &Value, name: &str) -> Value {
    value
        .as_object()
        .and_then(|o| o.borrow().as_record().and_then(|r| r.get(name).cloned()))
        .unwrap_or_default()
}

fn add_report(manager: &ObjectRef, report: &ObjectRef) -> Result<()> {
    if let Some(record) = report.borrow_mut().as_record_mut() {
        record.set("manager", manager.clone())?;
    }
    if let Some(list) = field(&Value::Object(manager.clone()), "reports").as_object() {
        if let Some(list) = list.borrow_mut().as_list_mut() {
            list.items.push(Value::Object(report.clone()));
        }
    }
    Ok(())
}

fn name_of(value: &Value) -> String {
    field(value, "name").as_str().unwrap_or("nobody").to_owned()
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let writer = config()?.build()?;
    let ada = employee(&writer, "Ada")?;
    let grace = employee(&writer, "Grace")?;
    let linus = employee(&writer, "Linus")?;
    add_report(&ada, &grace)?;
    add_report(&grace, &linus)?;

    let everyone = ObjectRef::array(
        TypeDesc::record("Employee"),
        vec![Value::Object(ada), Value::Object(grace), Value::Object(linus)],
    );
    let bytes = encode(&writer, &Value::Object(everyone))?;
    println!("encoded 3 employees into {} bytes", bytes.len());

    // The reader shares the configuration, not the registry instance.
    let reader = config()?.build()?;
    let decoded = decode(&reader, &bytes)?;
    let staff = decoded
        .as_object()
        .and_then(|o| o.borrow().as_array().map(|a| a.items.clone()))
        .unwrap_or_default();

    for person in &staff {
        println!("{:>6} reports to {}", name_of(person), name_of(&field(person, "manager")));
    }

    if let (Some(grace), Some(linus)) = (staff.get(1), staff.get(2)) {
        let same = field(linus, "manager") == *grace;
        println!("Linus's manager is the same object as Grace: {same}");
    }

    // Managers and reports point at each other, so unlink before dropping.
    if let Some(root) = decoded.as_object() {
        root.release_graph();
    }
    Ok(())
}
