//! The Python bootstrap script run inside the sandboxed child.
//!
//! Embedded as a constant rather than shipped as a file on disk, matching the
//! teacher's convention of embedding prompt/constant text directly in source.

/// Read by the child on startup; installs sandbox restrictions when
/// `RECURSE_SANDBOX` is set, then runs the line-framed request loop.
pub const BOOTSTRAP_SCRIPT: &str = r#"
import sys
import os
import io
import json
import resource
import builtins
import contextlib

_NAMESPACE = {"__name__": "__main__"}
_VAR_TYPES = {}
_VAR_SIZES = {}
_NEXT_CALLBACK_ID = [1]
_EXEC_COUNT = [0]


def _install_sandbox():
    if not os.environ.get("RECURSE_SANDBOX"):
        return

    mem_limit_mb = os.environ.get("RECURSE_MEMORY_LIMIT_MB")
    if mem_limit_mb:
        try:
            limit_bytes = int(mem_limit_mb) * 1024 * 1024
            resource.setrlimit(resource.RLIMIT_AS, (limit_bytes, limit_bytes))
        except (ValueError, OSError):
            pass

    cpu_limit_sec = os.environ.get("RECURSE_CPU_LIMIT_SEC")
    if cpu_limit_sec:
        try:
            limit_secs = int(cpu_limit_sec)
            resource.setrlimit(resource.RLIMIT_CPU, (limit_secs, limit_secs))
        except (ValueError, OSError):
            pass

    if not os.environ.get("RECURSE_NETWORK"):
        import socket

        def _blocked_socket(*args, **kwargs):
            raise OSError("network access disabled in sandbox")

        socket.socket = _blocked_socket


def _send(obj):
    sys.stdout.write(json.dumps(obj) + "\n")
    sys.stdout.flush()


def _callback(name, params):
    callback_id = _NEXT_CALLBACK_ID[0]
    _NEXT_CALLBACK_ID[0] += 1
    _send({"callback": name, "callback_id": callback_id, "params": params})
    while True:
        line = sys.stdin.readline()
        if not line:
            raise RuntimeError("host closed stdin during callback")
        reply = json.loads(line)
        if reply.get("callback_id") == callback_id:
            if reply.get("error") is not None:
                raise RuntimeError(reply["error"])
            if "results" in reply and reply["results"] is not None:
                return reply["results"]
            return reply.get("result")


def llm_call(prompt, context="", model=None):
    return _callback("llm_call", {"prompt": prompt, "context": context, "model": model})


def llm_batch(prompts, contexts=None, model=None):
    return _callback(
        "llm_batch", {"prompts": prompts, "contexts": contexts or [], "model": model}
    )


def memory_query(query, limit=10):
    return _callback("memory_query", {"query": query, "limit": limit})


def memory_add_fact(content, confidence=1.0):
    return _callback("memory_add_fact", {"content": content, "confidence": confidence})


def memory_add_experience(content, outcome, success, **kwargs):
    params = {"content": content, "outcome": outcome, "success": success}
    params.update(kwargs)
    return _callback("memory_add_experience", params)


def memory_get_context(limit=10):
    return _callback("memory_get_context", {"limit": limit})


def memory_relate(label, subject_id, object_id):
    return _callback(
        "memory_relate", {"label": label, "subject_id": subject_id, "object_id": object_id}
    )


def plugin_call(function, args=None):
    return _callback("plugin_call", {"function": function, "args": args or []})


def plugin_list():
    return _callback("plugin_list", {})


_NAMESPACE.update(
    {
        "llm_call": llm_call,
        "llm_batch": llm_batch,
        "memory_query": memory_query,
        "memory_add_fact": memory_add_fact,
        "memory_add_experience": memory_add_experience,
        "memory_get_context": memory_get_context,
        "memory_relate": memory_relate,
        "plugin_call": plugin_call,
        "plugin_list": plugin_list,
    }
)


def _handle_execute(params):
    code = params.get("code", "")
    stdout = io.StringIO()
    return_repr = None
    error_repr = None
    try:
        with contextlib.redirect_stdout(stdout):
            try:
                compiled = compile(code, "<repl>", "eval")
                result = eval(compiled, _NAMESPACE)
            except SyntaxError:
                compiled = compile(code, "<repl>", "exec")
                exec(compiled, _NAMESPACE)
                result = None
        if result is not None:
            return_repr = repr(result)
    except Exception as exc:  # noqa: BLE001 - reported to host, not raised
        error_repr = f"{type(exc).__name__}: {exc}"
    _EXEC_COUNT[0] += 1
    return {
        "output": stdout.getvalue(),
        "return_repr": return_repr,
        "error_repr": error_repr,
    }


def _handle_set_var(params):
    name = params["name"]
    value = params["value"]
    if not name.isidentifier():
        raise ValueError(f"invalid identifier: {name}")
    _NAMESPACE[name] = value
    _VAR_TYPES[name] = type(value).__name__
    _VAR_SIZES[name] = len(value.encode("utf-8"))
    return {"ok": True}


def _handle_get_var(params):
    name = params["name"]
    start = params.get("start", 0)
    end = params.get("end", 0)
    value = _NAMESPACE.get(name)
    if value is None:
        raise KeyError(f"no such variable: {name}")
    text = str(value)
    sliced = text[start:end] if end else text[start:]
    return {
        "value": sliced,
        "total_length": len(text),
        "type_name": _VAR_TYPES.get(name, type(value).__name__),
    }


def _handle_list_vars(_params):
    names = [n for n in _NAMESPACE if n not in ("__name__",) and not callable(_NAMESPACE[n])]
    return {"names": names}


def _handle_status(_params):
    usage = resource.getrusage(resource.RUSAGE_SELF)
    return {
        "running": True,
        "memory_mb": usage.ru_maxrss / 1024,
        "exec_count": _EXEC_COUNT[0],
        "cpu_ms": (usage.ru_utime + usage.ru_stime) * 1000,
    }


_METHODS = {
    "execute": _handle_execute,
    "set_var": _handle_set_var,
    "get_var": _handle_get_var,
    "list_vars": _handle_list_vars,
    "status": _handle_status,
}


def main():
    _install_sandbox()
    _send({"id": 0, "result": {"ready": True}})
    for line in sys.stdin:
        line = line.strip()
        if not line:
            continue
        request = json.loads(line)
        method = request.get("method")
        if method == "shutdown":
            _send({"id": request["id"], "result": {"ok": True}})
            break
        handler = _METHODS.get(method)
        if handler is None:
            _send(
                {
                    "id": request["id"],
                    "error": {"code": -32601, "message": f"unknown method: {method}"},
                }
            )
            continue
        try:
            result = handler(request.get("params", {}))
            _send({"id": request["id"], "result": result})
        except Exception as exc:  # noqa: BLE001
            _send(
                {
                    "id": request["id"],
                    "error": {"code": -32603, "message": str(exc)},
                }
            )


if __name__ == "__main__":
    main()
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_script_is_non_empty_and_defines_main() {
        assert!(BOOTSTRAP_SCRIPT.contains("def main()"));
        assert!(BOOTSTRAP_SCRIPT.contains("RECURSE_SANDBOX"));
        assert!(BOOTSTRAP_SCRIPT.contains("llm_call"));
    }
}
