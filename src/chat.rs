// Interactive terminal chat: each line is a report request against one transcript.

use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::credentials::Credentials;
use crate::pipeline::{ReportEvent, ReportPipeline};
use crate::transcript::Transcript;

#[derive(Debug, PartialEq, Eq)]
pub enum ChatCommand<'a> {
    Ask(&'a str),
    Clear,
    History,
    Quit,
    Empty,
}

pub fn parse_line(line: &str) -> ChatCommand<'_> {
    match line.trim() {
        "" => ChatCommand::Empty,
        "/clear" => ChatCommand::Clear,
        "/history" => ChatCommand::History,
        "/quit" | "/exit" => ChatCommand::Quit,
        _ => ChatCommand::Ask(line.trim_end_matches(['\r', '\n'])),
    }
}

fn describe(event: &ReportEvent) -> String {
    match event {
        ReportEvent::RewritingQuery => "正在优化搜索语句...".to_string(),
        ReportEvent::Searching { query } => format!("正在检索: {}", query),
        ReportEvent::EvidenceCollected { count } => format!("✅ 采集到 {} 条市场情报", count),
        ReportEvent::Drafting { provider } => format!("研发总监 ({}) 正在撰写策划案...", provider),
        ReportEvent::EnrichingImages { dishes } => format!("正在为 {} 道菜配图...", dishes),
        ReportEvent::Completed => "✅ 策划案已生成".to_string(),
        ReportEvent::Failed { error } => format!("出错啦: {}", error),
    }
}

/// Runs the chat loop until `/quit` or end of input. Returns the final transcript.
pub async fn run_chat<R, W>(
    pipeline: &ReportPipeline,
    credentials: &Credentials,
    input: R,
    output: &mut W,
) -> Result<Transcript>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut transcript = Transcript::new();
    let mut lines = input.lines();

    output
        .write_all("🦞 FoodHunter: 您的 AI 餐饮研发总监 (/clear 清空, /history 历史, /quit 退出)\n".as_bytes())
        .await?;

    loop {
        output.write_all(b"> ").await?;
        output.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match parse_line(&line) {
            ChatCommand::Empty => continue,
            ChatCommand::Quit => break,
            ChatCommand::Clear => {
                transcript.clear();
                output.write_all("对话已清空\n".as_bytes()).await?;
            }
            ChatCommand::History => {
                let rendered = transcript.render_plain();
                output.write_all(rendered.as_bytes()).await?;
                output.write_all(b"\n").await?;
            }
            ChatCommand::Ask(request) => {
                let (tx, mut rx) = mpsc::channel::<ReportEvent>(16);
                let result = pipeline
                    .run(&mut transcript, request, credentials, Some(&tx))
                    .await;
                drop(tx);
                while let Some(event) = rx.recv().await {
                    output.write_all(format!("  {}\n", describe(&event)).as_bytes()).await?;
                }
                match result {
                    Ok(report) => {
                        output.write_all(report.content.as_bytes()).await?;
                        output.write_all(b"\n").await?;
                    }
                    Err(e) if e.is_user_error() => {
                        output.write_all(format!("❌ {}\n", e).as_bytes()).await?;
                    }
                    Err(e) => {
                        warn!("Report failed: {}", e);
                        // The failure event has already been printed.
                    }
                }
            }
        }
    }

    output.flush().await?;
    Ok(transcript)
}

pub async fn run_terminal_chat(pipeline: &ReportPipeline, credentials: &Credentials) -> Result<()> {
    info!("Starting terminal chat...");
    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    let transcript = run_chat(pipeline, credentials, stdin, &mut stdout).await?;
    info!(turns = transcript.len(), "Chat session finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Settings;

    #[test]
    fn test_parse_line() {
        assert_eq!(parse_line("  "), ChatCommand::Empty);
        assert_eq!(parse_line("/clear"), ChatCommand::Clear);
        assert_eq!(parse_line(" /history "), ChatCommand::History);
        assert_eq!(parse_line("/exit"), ChatCommand::Quit);
        assert_eq!(parse_line(" 烤鱼口味\r\n"), ChatCommand::Ask(" 烤鱼口味"));
    }

    #[test]
    fn test_describe_events() {
        assert_eq!(
            describe(&ReportEvent::EvidenceCollected { count: 5 }),
            "✅ 采集到 5 条市场情报"
        );
        assert!(describe(&ReportEvent::Failed { error: "boom".into() }).contains("boom"));
    }

    #[tokio::test]
    async fn test_chat_without_credentials_reports_and_records_nothing() {
        let pipeline = ReportPipeline::new(Settings::default()).unwrap();
        let input: &[u8] = "火锅甜品\n/history\n/quit\n".as_bytes();
        let mut output = Vec::new();

        let transcript = run_chat(&pipeline, &Credentials::default(), input, &mut output)
            .await
            .unwrap();

        let printed = String::from_utf8(output).unwrap();
        assert!(printed.contains("❌ Missing credentials"));
        assert!(transcript.is_empty());
    }
}
