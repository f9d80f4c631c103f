//! Static vocabulary: synonym keywords, sequencing connectors, and paraphrase
//! expressions per command.

use crate::command::GameCommand;

// ── Keyword table ───────────────────────────────────────────────────────

/// (command, synonyms). English, romanised Japanese, and native script.
/// Matching is a case-insensitive substring test.
pub(crate) const KEYWORD_TABLE: &[(GameCommand, &[&str])] = &[
    (
        GameCommand::Attack,
        &[
            "attack",
            "fire",
            "shoot",
            "strike",
            "charge",
            "kougeki",
            "kogeki",
            "攻撃",
            "こうげき",
            "アタック",
            "撃て",
            "うて",
        ],
    ),
    (
        GameCommand::Defend,
        &[
            "defend",
            "defense",
            "defence",
            "guard",
            "shield",
            "block",
            "bougyo",
            "bogyo",
            "防御",
            "ぼうぎょ",
            "ディフェンス",
            "ガード",
            "守れ",
            "まもれ",
        ],
    ),
    (
        GameCommand::Retreat,
        &[
            "retreat",
            "fall back",
            "withdraw",
            "tettai",
            "撤退",
            "てったい",
            "退却",
            "逃げろ",
            "にげろ",
            "下がれ",
            "さがれ",
        ],
    ),
    (
        GameCommand::Status,
        &[
            "status",
            "report",
            "health",
            "situation",
            "joutai",
            "jotai",
            "状態",
            "じょうたい",
            "ステータス",
            "状況",
            "じょうきょう",
        ],
    ),
];

/// Phrases that sequence two commands ("attack, then defend").
pub(crate) const SEQUENCE_CONNECTORS: &[&str] = &[
    "してから",
    "して から",
    "したら",
    "の後に",
    "のあとに",
    "の後で",
    "のあとで",
    "それから",
    "そして",
    "and then",
    "then",
    "after that",
    "followed by",
    "afterwards",
];

// ── Paraphrase table ────────────────────────────────────────────────────

/// (command, expressions). Tried in order only when no keyword matched; the
/// first command with a matching expression wins. Compiled case-insensitive.
pub(crate) const PARAPHRASE_TABLE: &[(GameCommand, &[&str])] = &[
    (
        GameCommand::Attack,
        &[
            r"敵を?.*(やっつけ|倒せ|倒して|たおせ|たおして|攻め|せめ)",
            r"(やっつけ|ぶっ飛ば|ぶっとば|叩け|たたけ)",
            r"\b(take|knock|wipe) (them|it|em|the enemy) (out|down)\b",
            r"\bopen fire\b",
            r"\b(get|go get|hit|kill|destroy|smash) (them|em|it|the enemy)\b",
        ],
    ),
    (
        GameCommand::Defend,
        &[
            r"(守り|まもり)を?(固め|かため)",
            r"(身|み)を(守|まも)",
            r"(耐えろ|たえろ|防げ|ふせげ)",
            r"\bhold (the|your|our) (line|ground|position)\b",
            r"\b(protect|cover|brace)\b",
        ],
    ),
    (
        GameCommand::Retreat,
        &[
            r"(引け|ひけ|引き上げ|ひきあげ|引いて|ひいて)",
            r"(逃げ|にげ)",
            r"\b(back off|pull back|pull out|get out|run away|move back|go back)\b",
            r"\brun\b",
        ],
    ),
    (
        GameCommand::Status,
        &[
            r"(どう|どんな)(なって|感じ|かんじ)",
            r"(残り|のこり).*(体力|たいりょく|hp)",
            r"(体力|たいりょく)(は|を)",
            r"\bhow('s| is| are) (it|things|we|the base|everything)\b",
            r"\bwhat('s| is) (happening|going on)\b",
        ],
    ),
];

/// Synonyms for one command.
pub(crate) fn keywords_for(command: GameCommand) -> &'static [&'static str] {
    KEYWORD_TABLE
        .iter()
        .find(|(c, _)| *c == command)
        .map(|(_, words)| *words)
        .unwrap_or(&[])
}
