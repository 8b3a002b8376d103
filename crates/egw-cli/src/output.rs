use colored::Colorize;
use tabled::builder::Builder;
use tabled::settings::Style;

use egw_core::model::{CorsRule, GatewayFunction, Subscription};

pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

pub fn print_functions(functions: &[GatewayFunction]) {
    println!("{}", "Functions".cyan());
    if functions.is_empty() {
        println!("  (none)");
        return;
    }
    let mut builder = Builder::default();
    builder.push_record(["Function ID", "Type", "Target"]);
    for function in functions {
        let target = function
            .provider
            .get("arn")
            .or_else(|| function.provider.get("queueUrl"))
            .or_else(|| function.provider.get("streamName"))
            .or_else(|| function.provider.get("deliveryStreamName"))
            .and_then(|v| v.as_str())
            .unwrap_or("-");
        builder.push_record([
            function.function_id.as_str(),
            function.function_type.as_str(),
            target,
        ]);
    }
    println!("{}", builder.build().with(Style::rounded()));
}

pub fn print_subscriptions(subscriptions: &[Subscription]) {
    println!("{}", "Subscriptions".cyan());
    if subscriptions.is_empty() {
        println!("  (none)");
        return;
    }
    let mut builder = Builder::default();
    builder.push_record(["Event Type", "Kind", "Method", "Path", "Function ID"]);
    for subscription in subscriptions {
        builder.push_record([
            subscription.event_type.as_str(),
            subscription.kind.as_str(),
            subscription.method.as_deref().unwrap_or("-"),
            subscription.path.as_str(),
            subscription.function_id.as_str(),
        ]);
    }
    println!("{}", builder.build().with(Style::rounded()));
}

pub fn print_cors(rules: &[CorsRule]) {
    println!("{}", "CORS".cyan());
    if rules.is_empty() {
        println!("  (none)");
        return;
    }
    let mut builder = Builder::default();
    builder.push_record(["Method", "Path", "Allowed Origins", "Credentials"]);
    for rule in rules {
        let origins = rule.config.allowed_origins.join(", ");
        builder.push_record([
            rule.method.as_str(),
            rule.path.as_str(),
            origins.as_str(),
            if rule.config.allow_credentials { "yes" } else { "no" },
        ]);
    }
    println!("{}", builder.build().with(Style::rounded()));
}
