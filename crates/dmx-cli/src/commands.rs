use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use colored::Colorize;
use serde_json::Value;
use tracing::debug;

use dmx_core::{
    ChildValue, ClientState, CompositeValue, CoreRead, CoreService, DataType, Directive,
    Directives, ObjectModel, ReadContext, RoleQuery, ToDocument, TopicModel, TopicRef, TypeKind,
    TypeModel,
};
use dmx_store::{snapshot, HypergraphStore, InMemoryHypergraph};
use dmx_types::{uri, NodeId, PlayerRef, SimpleValue};

use crate::cli::*;
use crate::config::CliConfig;
use crate::define::TypesFile;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = CliConfig::resolve(cli.config.as_deref(), cli.store.as_deref())?;
    let format = cli.format;
    match cli.command {
        Command::Init => cmd_init(&config, format),
        Command::Define(args) => cmd_define(&config, format, args),
        Command::Types => cmd_types(&config, format),
        Command::Create(args) => cmd_create(&config, format, args),
        Command::Show(args) => cmd_show(&config, format, args),
        Command::Related(args) => cmd_related(&config, format, args),
        Command::Delete(args) => cmd_delete(&config, format, args),
    }
}

/// A core service over the snapshot file named by the config.
struct Session {
    path: PathBuf,
    graph: Arc<InMemoryHypergraph>,
    core: CoreService,
}

impl Session {
    fn open(config: &CliConfig) -> anyhow::Result<Self> {
        let path = config.store_path.clone();
        if !path.exists() {
            bail!("no store at {}; run `dmx init` first", path.display());
        }
        let graph = snapshot::load(&path)
            .with_context(|| format!("loading store {}", path.display()))?;
        Self::with_graph(config, path, graph)
    }

    fn create(config: &CliConfig) -> anyhow::Result<Self> {
        let path = config.store_path.clone();
        let graph = if path.exists() {
            snapshot::load(&path).with_context(|| format!("loading store {}", path.display()))?
        } else {
            InMemoryHypergraph::new()
        };
        Self::with_graph(config, path, graph)
    }

    fn with_graph(
        config: &CliConfig,
        path: PathBuf,
        graph: InMemoryHypergraph,
    ) -> anyhow::Result<Self> {
        let graph = Arc::new(graph);
        let store: Arc<dyn HypergraphStore> = graph.clone();
        let core = CoreService::new(store, config.core.clone())?;
        Ok(Self { path, graph, core })
    }

    fn read(&self) -> anyhow::Result<ReadContext<'_>> {
        Ok(self.core.read(ClientState::new())?)
    }

    fn save(&self) -> anyhow::Result<()> {
        snapshot::save(&self.graph, &self.path)
            .with_context(|| format!("saving store {}", self.path.display()))?;
        debug!(path = %self.path.display(), "store saved");
        Ok(())
    }
}

fn print_json(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_directives(format: OutputFormat, directives: &Directives) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => print_json(&directives.to_json()?),
        OutputFormat::Text => {
            for directive in directives.iter() {
                println!("  {} {}", directive.name().cyan(), describe(directive));
            }
            Ok(())
        }
    }
}

fn describe(directive: &Directive) -> String {
    match directive {
        Directive::CreateTopic(t) | Directive::UpdateTopic(t) | Directive::DeleteTopic(t) => {
            ObjectModel::Topic(t.clone()).describe()
        }
        Directive::CreateAssociation(a)
        | Directive::UpdateAssociation(a)
        | Directive::DeleteAssociation(a) => ObjectModel::Association(a.clone()).describe(),
        Directive::UpdateChildTopics { parent, key } => format!("topic {parent} {key}"),
        Directive::UpdateType(t) => t.uri.clone(),
        Directive::DeleteType { uri } => uri.clone(),
    }
}

fn value_text(value: Option<&SimpleValue>) -> String {
    match value {
        Some(v) => format!("{:?}", v.to_string()),
        None => "-".dimmed().to_string(),
    }
}

fn cmd_init(config: &CliConfig, format: OutputFormat) -> anyhow::Result<()> {
    let session = Session::create(config)?;
    let created = session.core.bootstrap()?;
    session.save()?;
    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "store": session.path.display().to_string(),
            "created": created,
            "revision": session.core.revision()?,
        })),
        OutputFormat::Text => {
            println!(
                "{} Initialized DMX store in {}",
                "✓".green().bold(),
                session.path.display().to_string().bold()
            );
            if created > 0 {
                println!("  Core topics: {}", created.to_string().cyan());
            }
            Ok(())
        }
    }
}

fn cmd_define(config: &CliConfig, format: OutputFormat, args: DefineArgs) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(&args.file)
        .with_context(|| format!("reading {}", args.file.display()))?;
    let models = TypesFile::parse(&text)?.to_models()?;
    let session = Session::open(config)?;

    let outcome = session.core.transaction(ClientState::new(), |ctx| {
        let mut skipped = Vec::new();
        for model in models {
            if ctx.get_type(&model.uri).is_ok() {
                skipped.push(model.uri);
                continue;
            }
            if model.kind == TypeKind::TopicType {
                ctx.create_topic_type(model)?;
            } else {
                ctx.create_assoc_type(model)?;
            }
        }
        Ok(skipped)
    })?;
    session.save()?;

    if format == OutputFormat::Text {
        for uri in &outcome.value {
            println!("  {} {} (already defined)", "skipped".yellow(), uri);
        }
    }
    print_directives(format, &outcome.directives)
}

fn all_types(read: &ReadContext<'_>) -> anyhow::Result<Vec<Arc<TypeModel>>> {
    let mut types = Vec::new();
    for meta in [uri::TOPIC_TYPE, uri::ASSOC_TYPE] {
        for topic in read.get_topics_by_type(meta)? {
            types.push(read.get_type(topic.uri())?);
        }
    }
    types.sort_by(|a, b| a.uri.cmp(&b.uri));
    Ok(types)
}

fn cmd_types(config: &CliConfig, format: OutputFormat) -> anyhow::Result<()> {
    let session = Session::open(config)?;
    let read = session.read()?;
    let types = all_types(&read)?;
    match format {
        OutputFormat::Json => {
            let docs = types
                .iter()
                .map(|t| t.to_json())
                .collect::<Result<Vec<_>, _>>()?;
            print_json(&Value::Array(docs))
        }
        OutputFormat::Text => {
            for ty in &types {
                let kind = match ty.kind {
                    TypeKind::TopicType => "topic",
                    TypeKind::AssocType => "assoc",
                };
                println!(
                    "{} {} {} {}",
                    ty.uri.bold(),
                    kind.dimmed(),
                    ty.data_type.uri().trim_start_matches(uri::CORE_PREFIX),
                    format!("{:?}", ty.label).dimmed()
                );
                for def in &ty.assoc_defs {
                    println!(
                        "  {} {} {}",
                        def.uri().cyan(),
                        def.kind.def_type_uri().trim_start_matches(uri::CORE_PREFIX),
                        def.child_cardinality.uri().trim_start_matches(uri::CORE_PREFIX)
                    );
                }
            }
            Ok(())
        }
    }
}

/// `KEY=VALUE` → key and child. `@123` and `@some.uri` reference existing
/// topics; anything else is parsed as the child type's data type.
fn parse_child(
    read: &ReadContext<'_>,
    ty: &TypeModel,
    spec: &str,
) -> anyhow::Result<(String, ChildValue)> {
    let Some((key, raw)) = spec.split_once('=') else {
        bail!("expected KEY=VALUE, got {spec:?}");
    };
    let Some(def) = ty.assoc_def(key) else {
        bail!("{} has no child {key:?}", ty.uri);
    };
    if let Some(target) = raw.strip_prefix('@') {
        let topic = match target.parse::<u64>() {
            Ok(id) => TopicRef::Id(NodeId(id)),
            Err(_) => TopicRef::Uri(target.to_string()),
        };
        return Ok((key.to_string(), ChildValue::Ref(topic)));
    }
    let child_type = read.get_type(&def.child_type_uri)?;
    Ok((key.to_string(), ChildValue::Scalar(parse_value(&child_type, raw)?)))
}

fn parse_value(ty: &TypeModel, raw: &str) -> anyhow::Result<SimpleValue> {
    if !ty.data_type.is_simple() {
        bail!("{} is {}, not a simple type", ty.uri, ty.data_type.uri());
    }
    SimpleValue::parse_as(ty.data_type.value_kind(), raw)
        .with_context(|| format!("value for {}", ty.uri))
}

fn topic_model(read: &ReadContext<'_>, args: &CreateArgs) -> anyhow::Result<TopicModel> {
    let ty = read.get_type(&args.type_uri)?;
    let mut model = TopicModel::new(&args.type_uri);
    if let Some(uri) = &args.uri {
        model = model.with_uri(uri);
    }
    if let Some(raw) = &args.value {
        if ty.data_type == DataType::Composite {
            bail!("{} is composite; use --set and --add", ty.uri);
        }
        model = model.with_value(parse_value(&ty, raw)?);
    }
    let mut children = CompositeValue::new();
    for spec in &args.set {
        let (key, child) = parse_child(read, &ty, spec)?;
        children.set(key, child);
    }
    for spec in &args.add {
        let (key, child) = parse_child(read, &ty, spec)?;
        children.add(key, child);
    }
    Ok(model.with_children(children))
}

fn cmd_create(config: &CliConfig, format: OutputFormat, args: CreateArgs) -> anyhow::Result<()> {
    let session = Session::open(config)?;
    let model = topic_model(&session.read()?, &args)?;
    let outcome = session
        .core
        .transaction(ClientState::new(), |ctx| ctx.create_topic(model))?;
    session.save()?;

    let topic = outcome.value;
    if format == OutputFormat::Text {
        println!(
            "{} Created topic {} {}",
            "✓".green().bold(),
            topic.id().to_string().yellow().bold(),
            value_text(topic.value())
        );
    }
    print_directives(format, &outcome.directives)
}

fn print_children(children: &CompositeValue, depth: usize) {
    let indent = "  ".repeat(depth);
    for (key, child) in children.iter() {
        let items: Vec<&ChildValue> = match child {
            ChildValue::Sequence(items) => items.iter().collect(),
            other => vec![other],
        };
        for item in items {
            if let ChildValue::Topic(t) = item {
                println!(
                    "{indent}{} {} {}",
                    key.cyan(),
                    t.id.to_string().yellow(),
                    value_text(t.value.as_ref())
                );
                print_children(&t.children, depth + 1);
            }
        }
    }
}

fn cmd_show(config: &CliConfig, format: OutputFormat, args: ShowArgs) -> anyhow::Result<()> {
    let session = Session::open(config)?;
    let read = session.read()?;
    let topic = match args.target.parse::<u64>() {
        Ok(id) => read.get_topic(NodeId(id))?,
        Err(_) => read.get_topic_by_uri(&args.target)?,
    };
    match format {
        OutputFormat::Json => print_json(&topic.to_json()?),
        OutputFormat::Text => {
            println!(
                "{} {} {}",
                topic.id().to_string().yellow().bold(),
                topic.type_uri().bold(),
                value_text(topic.value())
            );
            if !topic.uri().is_empty() {
                println!("  uri: {}", topic.uri());
            }
            print_children(topic.children(), 1);
            Ok(())
        }
    }
}

fn cmd_related(config: &CliConfig, format: OutputFormat, args: RelatedArgs) -> anyhow::Result<()> {
    let session = Session::open(config)?;
    let read = session.read()?;
    let mut query = RoleQuery::any();
    if let Some(u) = args.assoc_type {
        query = query.assoc_type(u);
    }
    if let Some(u) = args.my_role {
        query = query.my_role(u);
    }
    if let Some(u) = args.others_role {
        query = query.others_role(u);
    }
    if let Some(u) = args.others_type {
        query = query.others_type(u);
    }
    let related = read.related_topics(PlayerRef::Node(NodeId(args.id)), &query)?;
    match format {
        OutputFormat::Json => {
            let docs = related
                .iter()
                .map(|r| r.to_json())
                .collect::<Result<Vec<_>, _>>()?;
            print_json(&Value::Array(docs))
        }
        OutputFormat::Text => {
            for r in &related {
                let id = r.topic.id.map(|i| i.to_string()).unwrap_or_default();
                let assoc = r.assoc.id.map(|i| i.to_string()).unwrap_or_default();
                println!(
                    "{} {} {} {} {}",
                    id.yellow(),
                    r.topic.type_uri.bold(),
                    value_text(r.topic.value.as_ref()),
                    "via".dimmed(),
                    format!("{} {assoc}", r.assoc.type_uri).dimmed()
                );
            }
            Ok(())
        }
    }
}

fn cmd_delete(config: &CliConfig, format: OutputFormat, args: DeleteArgs) -> anyhow::Result<()> {
    let session = Session::open(config)?;
    let id = NodeId(args.id);
    let outcome = session
        .core
        .transaction(ClientState::new(), |ctx| ctx.delete_topic(id))?;
    session.save()?;
    if format == OutputFormat::Text {
        println!("{} Deleted topic {}", "✓".green().bold(), id.to_string().yellow());
    }
    print_directives(format, &outcome.directives)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    const TYPES: &str = r#"
[[type]]
uri = "acme.name"
label = "Name"
data_type = "text"

[[type]]
uri = "acme.phone"
label = "Phone"
data_type = "text"

[[type]]
uri = "acme.person"
label = "Person"
data_type = "composite"
label_config = ["acme.name"]
child = [
    { type = "acme.name" },
    { type = "acme.phone", cardinality = "many" },
]
"#;

    fn run(store: &std::path::Path, args: &[&str]) -> anyhow::Result<()> {
        let store = store.to_string_lossy().to_string();
        let mut argv = vec!["dmx", "--store", store.as_str()];
        argv.extend_from_slice(args);
        run_command(Cli::try_parse_from(argv)?)
    }

    fn open(store: &std::path::Path) -> Session {
        let config = CliConfig::resolve(None, Some(store)).unwrap();
        Session::open(&config).unwrap()
    }

    fn defined(dir: &tempfile::TempDir) -> PathBuf {
        let store = dir.path().join("dmx.snapshot");
        let types = dir.path().join("types.toml");
        std::fs::write(&types, TYPES).unwrap();
        run(&store, &["init"]).unwrap();
        run(&store, &["define", types.to_str().unwrap()]).unwrap();
        store
    }

    #[test]
    fn commands_need_an_initialized_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = dir.path().join("dmx.snapshot");
        let err = run(&store, &["types"]).unwrap_err();
        assert!(err.to_string().contains("dmx init"));
    }

    #[test]
    fn init_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = dir.path().join("dmx.snapshot");
        run(&store, &["init"]).unwrap();
        let revision = open(&store).core.revision().unwrap();
        run(&store, &["init"]).unwrap();
        assert_eq!(open(&store).core.revision().unwrap(), revision);
    }

    #[test]
    fn define_persists_types_and_skips_known_ones() {
        let dir = tempfile::tempdir().unwrap();
        let store = defined(&dir);
        let session = open(&store);
        let person = session.core.get_type("acme.person").unwrap();
        assert_eq!(person.assoc_defs.len(), 2);

        let types = dir.path().join("types.toml");
        run(&store, &["define", types.to_str().unwrap()]).unwrap();
        let read = open(&store);
        let listed = all_types(&read.read().unwrap()).unwrap();
        assert_eq!(listed.iter().filter(|t| t.uri == "acme.person").count(), 1);
    }

    #[test]
    fn create_show_delete_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = defined(&dir);
        run(
            &store,
            &[
                "create",
                "--type",
                "acme.person",
                "--uri",
                "acme.ann",
                "--set",
                "acme.name=Ann",
                "--add",
                "acme.phone=123",
                "--add",
                "acme.phone=456",
            ],
        )
        .unwrap();

        let session = open(&store);
        let ann = session.core.get_topic_by_uri("acme.ann").unwrap();
        assert_eq!(ann.value(), Some(&"Ann".into()));
        assert_eq!(ann.children().get_topics("acme.phone").unwrap().len(), 2);
        let id = ann.id().to_string();
        drop(session);

        run(&store, &["show", "acme.ann"]).unwrap();
        run(&store, &["--format", "json", "show", id.as_str()]).unwrap();
        run(&store, &["related", id.as_str(), "--others-type", "acme.phone"]).unwrap();

        run(&store, &["delete", id.as_str()]).unwrap();
        let session = open(&store);
        assert!(session.core.get_topic_by_uri("acme.ann").unwrap_err().is_not_found());
        assert!(session
            .read()
            .unwrap()
            .get_topics_by_type("acme.phone")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn create_rejects_unknown_keys_and_bad_values() {
        let dir = tempfile::tempdir().unwrap();
        let store = defined(&dir);
        assert!(run(&store, &["create", "--type", "acme.person", "--set", "acme.age=3"]).is_err());
        assert!(run(&store, &["create", "--type", "acme.person", "--set", "acme.name"]).is_err());
        assert!(run(&store, &["create", "--type", "acme.person", "--value", "Ann"]).is_err());
        assert!(run(&store, &["create", "--type", "acme.nobody"]).is_err());
    }

    #[test]
    fn references_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = defined(&dir);
        run(&store, &["create", "--type", "acme.name", "--value", "Bo"]).unwrap();
        let bo = open(&store).read().unwrap().get_topics_by_type("acme.name").unwrap()[0].id();

        let reference = format!("acme.name=@{bo}");
        run(&store, &["create", "--type", "acme.person", "--uri", "acme.bo", "--set", reference.as_str()])
            .unwrap();
        let person = open(&store).core.get_topic_by_uri("acme.bo").unwrap();
        assert_eq!(person.children().get_topic("acme.name").unwrap().id, bo);
    }

    #[test]
    fn types_lists_core_and_user_types() {
        let dir = tempfile::tempdir().unwrap();
        let store = defined(&dir);
        let session = open(&store);
        let types = all_types(&session.read().unwrap()).unwrap();
        assert!(types.iter().any(|t| t.uri == uri::COMPOSITION));
        assert!(types.iter().any(|t| t.uri == "acme.person"));
        run(&store, &["types"]).unwrap();
        run(&store, &["--format", "json", "types"]).unwrap();
    }
}
