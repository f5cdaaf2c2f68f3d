use murmur::db::models::{EntityType, NotificationKind};
use murmur::notify::{resolve_message, synthesize_message, Trigger};

fn all_triggers() -> Vec<(Trigger, NotificationKind, &'static str)> {
    vec![
        (Trigger::Like { post_id: 1 }, NotificationKind::Like, "Your post was liked."),
        (
            Trigger::Comment {
                post_id: 1,
                comment_id: 9,
            },
            NotificationKind::Comment,
            "Your post received a comment.",
        ),
        (Trigger::Follow, NotificationKind::Follow, "You have a new follower."),
        (Trigger::Repost { post_id: 1 }, NotificationKind::Repost, "Your post was reposted."),
        (
            Trigger::Transaction {
                amount: 0.1,
                signature: "sig".into(),
            },
            NotificationKind::Transaction,
            "You received 0.10 SOL.",
        ),
    ]
}

#[test]
fn every_trigger_has_a_fixed_message() {
    for (trigger, kind, expected) in all_triggers() {
        assert_eq!(trigger.kind(), kind);
        assert_eq!(synthesize_message(&trigger), expected, "{kind}");
    }
}

#[test]
fn explicit_message_wins_unless_blank() {
    for (trigger, _, expected) in all_triggers() {
        assert_eq!(resolve_message(&trigger, Some("custom text")), "custom text");
        assert_eq!(resolve_message(&trigger, Some("   ")), expected);
        assert_eq!(resolve_message(&trigger, None), expected);
    }
}

#[test]
fn transaction_amounts_round_to_two_places() {
    let cases = [
        (10.5, "You received 10.50 SOL."),
        (1.0, "You received 1.00 SOL."),
        (0.129, "You received 0.13 SOL."),
        (1234.567, "You received 1234.57 SOL."),
    ];
    for (amount, expected) in cases {
        let t = Trigger::Transaction {
            amount,
            signature: "s".into(),
        };
        assert_eq!(synthesize_message(&t), expected);
    }
}

#[test]
fn entities_point_at_the_right_record() {
    let cases = [
        (Trigger::Like { post_id: 4 }, Some((EntityType::Post, "4".to_string()))),
        (Trigger::Repost { post_id: 4 }, Some((EntityType::Post, "4".to_string()))),
        (
            Trigger::Comment {
                post_id: 4,
                comment_id: 17,
            },
            Some((EntityType::Comment, "17".to_string())),
        ),
        (Trigger::Follow, None),
        (
            Trigger::Transaction {
                amount: 1.0,
                signature: "abc".into(),
            },
            Some((EntityType::Transaction, "abc".to_string())),
        ),
    ];
    for (trigger, expected) in cases {
        assert_eq!(trigger.entity(), expected);
    }
}

#[test]
fn only_idempotent_kinds_collapse() {
    let collapsing: Vec<NotificationKind> = all_triggers()
        .into_iter()
        .filter(|(t, _, _)| t.collapses_repeats())
        .map(|(_, k, _)| k)
        .collect();
    assert_eq!(
        collapsing,
        vec![NotificationKind::Like, NotificationKind::Follow, NotificationKind::Repost]
    );
}
