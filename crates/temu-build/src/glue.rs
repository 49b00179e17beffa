//! Generated C glue compiled into the artifact.
//!
//! The glue is the artifact's only exported surface. It owns the bridge between the host's
//! flat load parameters and the emulator's `VirtMachineParams`, and keeps every
//! machine-construction pointer check on the C side of the boundary.
//!
//! Exported entry points:
//!
//! | symbol                   | purpose                                                   |
//! |--------------------------|-----------------------------------------------------------|
//! | `vm_error`               | diagnostics sink used by the emulator sources             |
//! | `temu_vm_class_names`    | `machine_names` of the i-th compiled class, or `NULL`     |
//! | `temu_vm_load`           | build params, resolve class, attach console, construct    |
//! | `temu_vm_refresh`        | display refresh                                           |
//! | `temu_vm_interp`         | one bounded interpretation call                           |
//! | `temu_vm_iterate`        | refresh followed by one bounded interpretation call       |
//! | `temu_vm_console_resize` | forward a host window size to the guest console           |
//! | `temu_vm_end`            | tear the machine down                                     |

/// File name of the generated glue source inside the object directory.
pub const GLUE_SOURCE: &str = "temu_glue.c";

/// Number of file slots in `TemuLoadParams`.
pub const GLUE_FILE_COUNT: usize = 4;

const TEMPLATE: &str = r#"/* Generated by temu-build @VERSION@. Do not edit. */
#include <stdlib.h>
#include <stdio.h>
#include <stdarg.h>
#include <string.h>
#include <inttypes.h>

#include "cutils.h"
#include "iomem.h"
#include "virtio.h"
#include "machine.h"

#define TEMU_FILE_COUNT @FILE_COUNT@

typedef struct {
    const char *name;
    const uint8_t *buf;
    int len;
} TemuFile;

typedef struct {
    const char *machine_name;
    uint64_t ram_size;
    int width;
    int height;
    const char *display_device;
    const char *input_device;
    const char *cmdline;
    TemuFile files[TEMU_FILE_COUNT];
} TemuLoadParams;

typedef struct {
    VirtMachine *vm;
    CharacterDevice console;
} TemuInstance;

static const VirtMachineClass *const temu_classes[] = {
    &riscv_machine_class,
#ifdef CONFIG_X86EMU
    &pc_machine_class,
#endif
    NULL,
};

static TemuInstance *temu_current;

void __attribute__((format(printf, 1, 2))) vm_error(const char *fmt, ...)
{
    va_list ap;

    va_start(ap, fmt);
    vfprintf(stderr, fmt, ap);
    va_end(ap);
}

const char *temu_vm_class_names(int index)
{
    int i;

    if (index < 0)
        return NULL;
    for (i = 0; temu_classes[i] != NULL; i++) {
        if (i == index)
            return temu_classes[i]->machine_names;
    }
    return NULL;
}

static const VirtMachineClass *temu_find_class(const char *name)
{
    const VirtMachineClass *const *pp;
    size_t len = strlen(name);

    for (pp = temu_classes; *pp != NULL; pp++) {
        const char *p = (*pp)->machine_names;
        for (;;) {
            const char *r = strchr(p, ',');
            size_t n = r ? (size_t)(r - p) : strlen(p);
            if (n == len && memcmp(p, name, len) == 0)
                return *pp;
            if (!r)
                break;
            p = r + 1;
        }
    }
    return NULL;
}

static char *temu_strdup(const char *s)
{
    return s ? strdup(s) : NULL;
}

static void temu_free_params(VirtMachineParams *p)
{
    int i;

    free(p->machine_name);
    free(p->display_device);
    free(p->input_device);
    free(p->cmdline);
    for (i = 0; i < VM_FILE_COUNT; i++) {
        free(p->files[i].filename);
        free(p->files[i].buf);
        p->files[i].filename = NULL;
        p->files[i].buf = NULL;
        p->files[i].len = 0;
    }
}

/* Returns NULL on any failure without reporting it; the host reports it once. */
void *temu_vm_load(const TemuLoadParams *lp, const CharacterDevice *console)
{
    VirtMachineParams p_s, *p = &p_s;
    const VirtMachineClass *vmc;
    TemuInstance *inst;
    int i;

    if (!lp || !lp->machine_name || !console)
        return NULL;
    if (temu_current)
        return NULL;
    vmc = temu_find_class(lp->machine_name);
    if (!vmc)
        return NULL;

    memset(p, 0, sizeof(*p));
    p->machine_name = temu_strdup(lp->machine_name);
    p->vmc = vmc;
    vmc->virt_machine_set_defaults(p);

    p->ram_size = lp->ram_size;
    p->width = lp->width;
    p->height = lp->height;
    if (lp->display_device) {
        free(p->display_device);
        p->display_device = temu_strdup(lp->display_device);
    }
    if (lp->input_device) {
        free(p->input_device);
        p->input_device = temu_strdup(lp->input_device);
    }
    if (lp->cmdline) {
        free(p->cmdline);
        p->cmdline = temu_strdup(lp->cmdline);
    }
    for (i = 0; i < TEMU_FILE_COUNT && i < VM_FILE_COUNT; i++) {
        const TemuFile *f = &lp->files[i];
        if (!f->buf || f->len <= 0)
            continue;
        p->files[i].buf = malloc(f->len);
        if (!p->files[i].buf) {
            temu_free_params(p);
            return NULL;
        }
        memcpy(p->files[i].buf, f->buf, f->len);
        p->files[i].len = f->len;
        p->files[i].filename = temu_strdup(f->name);
    }

    inst = calloc(1, sizeof(*inst));
    if (!inst) {
        temu_free_params(p);
        return NULL;
    }
    inst->console = *console;
    p->console = &inst->console;

#ifdef CONFIG_SDL
    if (p->display_device)
        sdl_init(p->width, p->height);
#endif

    inst->vm = vmc->virt_machine_init(p);
    temu_free_params(p);
    if (!inst->vm) {
        free(inst);
        return NULL;
    }
    temu_current = inst;
    return inst;
}

void temu_vm_refresh(void *handle)
{
#ifdef CONFIG_SDL
    TemuInstance *inst = handle;

    if (inst && inst->vm->fb_dev)
        sdl_refresh(inst->vm);
#else
    (void)handle;
#endif
}

void temu_vm_interp(void *handle, int max_exec_cycle)
{
    TemuInstance *inst = handle;

    if (!inst)
        return;
    inst->vm->vmc->virt_machine_interp(inst->vm, max_exec_cycle);
}

void temu_vm_iterate(void *handle, int max_exec_cycle)
{
    temu_vm_refresh(handle);
    temu_vm_interp(handle, max_exec_cycle);
}

void temu_vm_console_resize(void *handle, int width, int height)
{
    TemuInstance *inst = handle;

    if (inst && inst->vm->console_dev)
        virtio_console_resize_event(inst->vm->console_dev, width, height);
}

void temu_vm_end(void *handle)
{
    TemuInstance *inst = handle;

    if (!inst)
        return;
    inst->vm->vmc->virt_machine_end(inst->vm);
    if (temu_current == inst)
        temu_current = NULL;
    free(inst);
}
"#;

/// Renders the glue source.
pub fn render(version: &str) -> String {
    TEMPLATE
        .replace("@VERSION@", version)
        .replace("@FILE_COUNT@", &GLUE_FILE_COUNT.to_string())
}
