use rampart::{rule, FieldRequest, RuleInput, RuleRegistry, RuleTree, Shield, ShieldOptions};
use serde_json::json;
use tracing_subscriber::EnvFilter;

struct Viewer {
    id: Option<u64>,
    roles: Vec<&'static str>,
}

impl Viewer {
    fn has(&self, role: &str) -> bool {
        self.roles.iter().any(|r| *r == role)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let registry = RuleRegistry::new()
        .register(rule("isAuthenticated").check_sync(|i: &RuleInput<Viewer>| i.context().id.is_some()))
        .register(rule("isAdmin").check_sync(|i: &RuleInput<Viewer>| i.context().has("admin")))
        .register(rule("isEditor").check_sync(|i: &RuleInput<Viewer>| i.context().has("editor")))
        .register(rule("isBanned").check_sync(|i: &RuleInput<Viewer>| i.context().has("banned")))
        .register(rule("isPostOwner").check_sync(|i: &RuleInput<Viewer>| {
            let author = i.arg("authorId").and_then(|v| v.as_u64());
            author.is_some() && author == i.context().id
        }));

    let tree = RuleTree::from_file("demos/blog.policy", &registry).expect("failed to load policy");
    println!("{tree}");

    let options = ShieldOptions::from_json(r#"{ "denial_message": "forbidden" }"#)
        .expect("invalid options");
    let shield = Shield::with_options(tree, options);

    let editor = Viewer {
        id: Some(3),
        roles: vec!["editor"],
    };
    let scope = shield.request(editor);

    let fields = [
        FieldRequest::new("Query", "posts"),
        FieldRequest::new("Query", "drafts"),
        FieldRequest::new("Post", "authorEmail"),
        FieldRequest::new("Mutation", "deletePost").args(json!({ "authorId": 3 })),
        FieldRequest::new("Mutation", "deletePost").args(json!({ "authorId": 4 })),
        FieldRequest::new("Comment", "body"),
    ];
    for field in &fields {
        let decision = shield.check(&scope, field).await;
        println!("{:<22} {decision}", field.info().to_string());
    }
}
