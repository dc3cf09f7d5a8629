use std::collections::HashMap;
use std::time::Duration;

use rampart::{
    and, or, rule, CacheMode, Decision, FieldOutcome, FieldRequest, RuleInput, RuleTreeBuilder,
    Shield, ShieldError, ShieldOptions,
};
use serde_json::json;
use tracing_subscriber::EnvFilter;

struct Viewer {
    id: Option<u64>,
    admin: bool,
}

struct AppContext {
    viewer: Viewer,
    /// post id -> author id; stands in for a database.
    posts: HashMap<u64, u64>,
}

impl AppContext {
    fn new(id: Option<u64>, admin: bool) -> Self {
        Self {
            viewer: Viewer { id, admin },
            posts: HashMap::from([(1, 10), (2, 20)]),
        }
    }
}

async fn delete_post(id: u64) -> Result<String, String> {
    tokio::time::sleep(Duration::from_millis(5)).await;
    Ok(format!("post {id} deleted"))
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rampart=debug")),
        )
        .init();

    let is_authenticated = rule("isAuthenticated")
        .check_sync(|input: &RuleInput<AppContext>| input.context().viewer.id.is_some());
    let is_admin =
        rule("isAdmin").check_sync(|input: &RuleInput<AppContext>| input.context().viewer.admin);
    let is_post_owner = rule("isPostOwner")
        .cache(CacheMode::Strict)
        .check(|input: RuleInput<AppContext>| async move {
            // Simulated lookup latency.
            tokio::time::sleep(Duration::from_millis(2)).await;
            let post = input.arg("id").and_then(|v| v.as_u64());
            let author = post.and_then(|id| input.context().posts.get(&id).copied());
            match author {
                Some(author) if Some(author) == input.context().viewer.id => Decision::Allow,
                Some(_) => Decision::deny_with("you can only delete your own posts"),
                None => Decision::deny_with("no such post"),
            }
        });

    let tree = RuleTreeBuilder::new()
        .rules("Query", |t| t.field("me", is_authenticated.clone()))
        .field(
            "Mutation",
            "deletePost",
            and([is_authenticated, or([is_admin, is_post_owner])]),
        )
        .build()
        .expect("failed to build rule tree");

    let shield = Shield::with_options(tree, ShieldOptions::default());
    println!("{}", shield.tree());

    let attempts = [
        ("author", AppContext::new(Some(10), false), 1),
        ("stranger", AppContext::new(Some(20), false), 1),
        ("admin", AppContext::new(Some(99), true), 2),
        ("anonymous", AppContext::new(None, false), 2),
    ];

    for (who, ctx, post) in attempts {
        let scope = shield.request(ctx);
        let field = FieldRequest::new("Mutation", "deletePost").args(json!({ "id": post }));
        match shield.resolve(&scope, field, || delete_post(post)).await {
            Ok(FieldOutcome::Resolved(message)) => println!("{who}: {message}"),
            Ok(FieldOutcome::Redacted(denial)) => {
                println!("{who}: null [{}] {denial}", denial.code());
            }
            Err(ShieldError::Resolver(e)) => println!("{who}: resolver failed: {e}"),
            Err(e) => println!("{who}: request aborted: {e}"),
        }
        println!("  cache: {:?}", scope.cache().stats());
    }
}
