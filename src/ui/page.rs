//! Browser chat page.
//!
//! A single self-contained document: it starts a session, subscribes to the
//! session's event stream and posts messages. No external assets.

/// Render the chat page.
#[must_use]
pub fn chat_page(title: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>{title}</title>
    <style>
        body {{ font-family: system-ui, sans-serif; margin: 0; background: #111318; color: #e6e6e6; }}
        main {{ max-width: 48rem; margin: 0 auto; display: flex; flex-direction: column; height: 100vh; }}
        header {{ padding: 1rem; font-weight: 600; }}
        #messages {{ flex: 1; overflow-y: auto; padding: 0 1rem; }}
        .msg {{ margin: 0.5rem 0; padding: 0.75rem 1rem; border-radius: 0.75rem; white-space: pre-wrap; }}
        .msg .author {{ font-size: 0.75rem; opacity: 0.6; display: block; margin-bottom: 0.25rem; }}
        .msg.user {{ background: #2b3245; margin-left: 20%; }}
        .msg.other {{ background: #1d2129; margin-right: 20%; }}
        form {{ display: flex; gap: 0.5rem; padding: 1rem; }}
        textarea {{ flex: 1; resize: none; padding: 0.75rem; border-radius: 0.75rem; border: none; background: #1d2129; color: inherit; }}
        button {{ padding: 0 1.25rem; border-radius: 0.75rem; border: none; background: #4f6bed; color: white; }}
    </style>
</head>
<body>
<main>
    <header>{title}</header>
    <div id="messages"></div>
    <form id="composer">
        <textarea name="content" rows="2" placeholder="Type your message..." required></textarea>
        <button type="submit">Send</button>
    </form>
</main>
<script>
(async () => {{
    const list = document.getElementById('messages');
    const form = document.getElementById('composer');
    const nodes = new Map();

    function render(m) {{
        let node = nodes.get(m.id);
        if (!node) {{
            node = document.createElement('div');
            node.className = 'msg ' + (m.author === 'user' ? 'user' : 'other');
            node.innerHTML = '<span class="author"></span><span class="content"></span>';
            node.querySelector('.author').textContent = m.author;
            nodes.set(m.id, node);
            list.appendChild(node);
        }}
        node.querySelector('.content').textContent = m.content;
        list.scrollTop = list.scrollHeight;
    }}

    const started = await fetch('/api/sessions', {{ method: 'POST' }}).then(r => r.json());
    const sessionId = started.session_id;

    const events = new EventSource(`/api/sessions/${{sessionId}}/events`);
    events.addEventListener('message.created', e => render(JSON.parse(e.data).data));
    events.addEventListener('message.updated', e => {{
        const u = JSON.parse(e.data).data;
        const node = nodes.get(u.id);
        if (node) {{ node.querySelector('.content').textContent = u.content; }}
    }});

    const transcript = await fetch(`/api/sessions/${{sessionId}}/messages`).then(r => r.json());
    transcript.forEach(render);

    form.addEventListener('submit', async (e) => {{
        e.preventDefault();
        const field = form.elements.content;
        const content = field.value.trim();
        if (!content) return;
        field.value = '';
        await fetch(`/api/sessions/${{sessionId}}/messages`, {{
            method: 'POST',
            headers: {{ 'Content-Type': 'application/json' }},
            body: JSON.stringify({{ content }}),
        }});
    }});
    form.elements.content.addEventListener('keydown', (e) => {{
        if (e.key === 'Enter' && !e.shiftKey) {{ e.preventDefault(); form.requestSubmit(); }}
    }});
}})();
</script>
</body>
</html>"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_wires_session_endpoints() {
        let html = chat_page("Agent Chat");
        assert!(html.contains("<title>Agent Chat</title>"));
        assert!(html.contains("/api/sessions"));
        assert!(html.contains("message.updated"));
    }
}
